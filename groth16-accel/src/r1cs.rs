//! Rank-1 constraint systems and their solver
//!
//! Wires are laid out as `[one | public | private]`. Every private wire is computed by a hint, in
//! allocation order, so a hint only refers to wires allocated before it.

use ark_ff::PrimeField;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use std::ops::{Add, Mul, Neg, Sub};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Variable {
    One,
    Public(usize),
    Private(usize),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinearCombination<F: PrimeField>(pub Vec<(F, Variable)>);

impl<F: PrimeField> LinearCombination<F> {
    pub fn zero() -> Self {
        Self(Vec::new())
    }

    pub fn constant(value: F) -> Self {
        Self(vec![(value, Variable::One)])
    }

    fn evaluate(&self, cs: &ConstraintSystem<F>, wires: &[F]) -> F {
        self.0
            .iter()
            .map(|(coeff, var)| *coeff * wires[cs.wire_index(*var)])
            .sum()
    }
}

impl<F: PrimeField> From<Variable> for LinearCombination<F> {
    fn from(var: Variable) -> Self {
        Self(vec![(F::ONE, var)])
    }
}

impl<F: PrimeField> From<(F, Variable)> for LinearCombination<F> {
    fn from(term: (F, Variable)) -> Self {
        Self(vec![term])
    }
}

impl<F: PrimeField> Add for LinearCombination<F> {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self.0.extend(rhs.0);
        self
    }
}

impl<F: PrimeField> Neg for LinearCombination<F> {
    type Output = Self;

    fn neg(mut self) -> Self {
        self.0.iter_mut().for_each(|(coeff, _)| *coeff = -*coeff);
        self
    }
}

impl<F: PrimeField> Sub for LinearCombination<F> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self + (-rhs)
    }
}

impl<F: PrimeField> Mul<F> for LinearCombination<F> {
    type Output = Self;

    fn mul(mut self, rhs: F) -> Self {
        self.0.iter_mut().for_each(|(coeff, _)| *coeff *= rhs);
        self
    }
}

/// `<a, w> * <b, w> = <c, w>`
#[derive(Clone, Debug)]
pub struct Constraint<F: PrimeField> {
    pub a: LinearCombination<F>,
    pub b: LinearCombination<F>,
    pub c: LinearCombination<F>,
}

#[derive(Clone, Debug)]
enum Hint<F: PrimeField> {
    Input(usize),
    Product(LinearCombination<F>, LinearCombination<F>),
    Commitment(usize),
}

/// Wires bound by one Pedersen commitment, as wire indices
#[derive(Clone, Debug, Default, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct CommitmentInfo {
    pub public_committed: Vec<usize>,
    pub private_committed: Vec<usize>,
    pub commitment_wire: usize,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolveError {
    #[error("expected {expected} {kind} inputs, got {found}")]
    WrongInputCount {
        kind: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("constraint {0} is not satisfied")]
    Unsatisfied(usize),

    #[error("commitment {index}: {reason}")]
    Commitment { index: usize, reason: String },
}

/// Assignment of every wire and the evaluation of the three constraint matrices
#[derive(Clone, Debug)]
pub struct Solution<F> {
    pub a: Vec<F>,
    pub b: Vec<F>,
    pub c: Vec<F>,
    pub w: Vec<F>,
}

#[derive(Clone, Debug, Default)]
pub struct ConstraintSystem<F: PrimeField> {
    num_public: usize,
    num_secret: usize,
    hints: Vec<Hint<F>>,
    constraints: Vec<Constraint<F>>,
    committed: Vec<Vec<Variable>>,
}

impl<F: PrimeField> ConstraintSystem<F> {
    pub fn new() -> Self {
        Self {
            num_public: 0,
            num_secret: 0,
            hints: Vec::new(),
            constraints: Vec::new(),
            committed: Vec::new(),
        }
    }

    pub fn public_input(&mut self) -> Variable {
        self.num_public += 1;
        Variable::Public(self.num_public - 1)
    }

    pub fn secret_input(&mut self) -> Variable {
        self.num_secret += 1;
        self.alloc(Hint::Input(self.num_secret - 1))
    }

    fn alloc(&mut self, hint: Hint<F>) -> Variable {
        self.hints.push(hint);
        Variable::Private(self.hints.len() - 1)
    }

    /// Allocate `a * b` and constrain it
    pub fn mul(
        &mut self,
        a: impl Into<LinearCombination<F>>,
        b: impl Into<LinearCombination<F>>,
    ) -> Variable {
        let (a, b) = (a.into(), b.into());
        let res = self.alloc(Hint::Product(a.clone(), b.clone()));
        self.assert_mul(a, b, res);
        res
    }

    pub fn add(
        &mut self,
        a: impl Into<LinearCombination<F>>,
        b: impl Into<LinearCombination<F>>,
    ) -> LinearCombination<F> {
        a.into() + b.into()
    }

    pub fn assert_equal(
        &mut self,
        a: impl Into<LinearCombination<F>>,
        b: impl Into<LinearCombination<F>>,
    ) {
        self.assert_mul(a.into() - b.into(), Variable::One, LinearCombination::zero());
    }

    pub fn assert_mul(
        &mut self,
        a: impl Into<LinearCombination<F>>,
        b: impl Into<LinearCombination<F>>,
        c: impl Into<LinearCombination<F>>,
    ) {
        self.constraints.push(Constraint {
            a: a.into(),
            b: b.into(),
            c: c.into(),
        });
    }

    /// Bind `vars` with a Pedersen commitment and return the wire holding its hash
    pub fn commit(&mut self, vars: &[Variable]) -> Variable {
        let wire = self.alloc(Hint::Commitment(self.committed.len()));
        self.committed.push(vars.to_vec());
        wire
    }

    pub fn num_public(&self) -> usize {
        self.num_public
    }

    pub fn num_secret(&self) -> usize {
        self.num_secret
    }

    /// The constant wire and the public inputs
    pub fn num_public_wires(&self) -> usize {
        1 + self.num_public
    }

    pub fn num_wires(&self) -> usize {
        self.num_public_wires() + self.hints.len()
    }

    /// User constraints plus one input row per public wire
    pub fn num_constraints(&self) -> usize {
        self.constraints.len() + self.num_public_wires()
    }

    pub fn wire_index(&self, var: Variable) -> usize {
        match var {
            Variable::One => 0,
            Variable::Public(i) => 1 + i,
            Variable::Private(i) => self.num_public_wires() + i,
        }
    }

    /// Committed wires of every commitment, resolved to wire indices
    pub fn commitment_info(&self) -> Vec<CommitmentInfo> {
        self.committed
            .iter()
            .zip(&self.hints_of_commitments())
            .map(|(vars, &commitment_wire)| {
                let (mut public_committed, mut private_committed) = (Vec::new(), Vec::new());
                for &var in vars {
                    match var {
                        Variable::One => {}
                        Variable::Public(_) => public_committed.push(self.wire_index(var)),
                        Variable::Private(_) => private_committed.push(self.wire_index(var)),
                    }
                }
                CommitmentInfo {
                    public_committed,
                    private_committed,
                    commitment_wire,
                }
            })
            .collect()
    }

    fn hints_of_commitments(&self) -> Vec<usize> {
        let mut wires = vec![0; self.committed.len()];
        for (i, hint) in self.hints.iter().enumerate() {
            if let Hint::Commitment(index) = hint {
                wires[*index] = self.num_public_wires() + i;
            }
        }
        wires
    }

    /// Rows of the three matrices, the input rows `w_i * 0 = 0` of the public wires come last
    pub fn rows(&self) -> impl Iterator<Item = (usize, Constraint<F>)> + '_ {
        let inputs = (0..self.num_public_wires()).map(|wire| Constraint {
            a: LinearCombination::from(match wire {
                0 => Variable::One,
                i => Variable::Public(i - 1),
            }),
            b: LinearCombination::zero(),
            c: LinearCombination::zero(),
        });
        self.constraints.iter().cloned().chain(inputs).enumerate()
    }

    /// Compute every wire and the evaluations of the three matrices
    ///
    /// `commit` receives the index of the commitment, the private then the public committed
    /// values, and returns the value of the commitment wire.
    pub fn solve<H>(
        &self,
        public: &[F],
        secret: &[F],
        mut commit: H,
    ) -> Result<Solution<F>, SolveError>
    where
        H: FnMut(usize, &[F], &[F]) -> Result<F, String>,
    {
        if public.len() != self.num_public {
            return Err(SolveError::WrongInputCount {
                kind: "public",
                expected: self.num_public,
                found: public.len(),
            });
        }
        if secret.len() != self.num_secret {
            return Err(SolveError::WrongInputCount {
                kind: "secret",
                expected: self.num_secret,
                found: secret.len(),
            });
        }

        let commitment_info = self.commitment_info();
        let mut w = Vec::with_capacity(self.num_wires());
        w.push(F::ONE);
        w.extend_from_slice(public);
        for hint in &self.hints {
            let value = match hint {
                Hint::Input(i) => secret[*i],
                Hint::Product(a, b) => a.evaluate(self, &w) * b.evaluate(self, &w),
                Hint::Commitment(index) => {
                    let info = &commitment_info[*index];
                    let private = info.private_committed.iter().map(|&j| w[j]).collect::<Vec<_>>();
                    let public = info.public_committed.iter().map(|&j| w[j]).collect::<Vec<_>>();
                    commit(*index, &private, &public).map_err(|reason| SolveError::Commitment {
                        index: *index,
                        reason,
                    })?
                }
            };
            w.push(value);
        }

        let num_rows = self.num_constraints();
        let (mut a, mut b, mut c) = (
            Vec::with_capacity(num_rows),
            Vec::with_capacity(num_rows),
            Vec::with_capacity(num_rows),
        );
        for (i, row) in self.rows() {
            let (x, y, z) = (
                row.a.evaluate(self, &w),
                row.b.evaluate(self, &w),
                row.c.evaluate(self, &w),
            );
            if x * y != z {
                return Err(SolveError::Unsatisfied(i));
            }
            a.push(x);
            b.push(y);
            c.push(z);
        }

        Ok(Solution { a, b, c, w })
    }
}
