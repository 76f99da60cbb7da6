use crate::repr::{decode_all, encode_all, DeviceRepr};
use crate::stream::Stream;
use crate::vec::DeviceVec;
use crate::{DeviceError, Result};
use ark_ff::Field;
use rayon::prelude::*;

fn binary_op_async<F, Op>(
    op: &'static str,
    lhs: &mut DeviceVec<F>,
    rhs: &DeviceVec<F>,
    stream: &Stream,
    f: Op,
) -> Result<()>
where
    F: Field + DeviceRepr,
    Op: Fn(&mut F, &F) + Send + Sync + 'static,
{
    lhs.check_stream(stream)?;
    rhs.check_stream(stream)?;
    if lhs.len() != rhs.len() {
        return Err(DeviceError::LengthMismatch {
            op,
            left: lhs.len(),
            right: rhs.len(),
        });
    }

    let out = lhs.alloc.clone();
    let other = rhs.alloc.clone();
    stream.submit(move || {
        let mut words = out.write();
        let mut values = decode_all::<F>(&words, op)?;
        let others = decode_all::<F>(&other.read(), op)?;
        values
            .par_iter_mut()
            .zip(others.par_iter())
            .for_each(|(a, b)| f(a, b));
        encode_all(&values, &mut words);
        Ok(())
    })
}

/// `lhs[i] *= rhs[i]`
pub fn mul_assign_async<F: Field + DeviceRepr>(
    lhs: &mut DeviceVec<F>,
    rhs: &DeviceVec<F>,
    stream: &Stream,
) -> Result<()> {
    binary_op_async("vec_mul", lhs, rhs, stream, |a, b| *a *= b)
}

/// `lhs[i] -= rhs[i]`
pub fn sub_assign_async<F: Field + DeviceRepr>(
    lhs: &mut DeviceVec<F>,
    rhs: &DeviceVec<F>,
    stream: &Stream,
) -> Result<()> {
    binary_op_async("vec_sub", lhs, rhs, stream, |a, b| *a -= b)
}

/// `lhs[i] += rhs[i]`
pub fn add_assign_async<F: Field + DeviceRepr>(
    lhs: &mut DeviceVec<F>,
    rhs: &DeviceVec<F>,
    stream: &Stream,
) -> Result<()> {
    binary_op_async("vec_add", lhs, rhs, stream, |a, b| *a += b)
}
