//! Quotient polynomial `H = (A·B - C) / Z`
//!
//! The evaluations of A, B and C on the constraint domain are interpolated, evaluated on a coset
//! where the vanishing polynomial is a non-zero constant, combined there, and interpolated back.
//! Both paths return the `n` coefficients of H in natural order, the last one is always zero.

use crate::domain::FftDomain;
use crate::error::{Stage, StageContext};
use crate::ProverError;
use ark_ff::FftField;
use ark_poly::EvaluationDomain;
use zk_device_backend::kernels::{
    from_montgomery_async, mul_assign_async, ntt_async, sub_assign_async, DeviceNttDomain,
};
use zk_device_backend::{Device, DeviceRepr, DeviceVec, NttConfig, NttDirection, Ordering, Stream};

fn check_inputs<F>(n: usize, a: &[F], b: &[F], c: &[F]) -> Result<(), ProverError> {
    if a.len() != b.len() || a.len() != c.len() {
        return Err(ProverError::invariant(
            Stage::HComputation,
            format!(
                "witness vectors differ in length: {} {} {}",
                a.len(),
                b.len(),
                c.len()
            ),
        ));
    }
    if a.len() > n {
        return Err(ProverError::invariant(
            Stage::HComputation,
            format!("{} constraints do not fit a domain of size {n}", a.len()),
        ));
    }
    Ok(())
}

/// CPU reference, on the coset of the multiplicative generator
pub fn compute_h_cpu<F: FftField>(
    domain: &FftDomain<F>,
    mut a: Vec<F>,
    mut b: Vec<F>,
    mut c: Vec<F>,
) -> Result<Vec<F>, ProverError> {
    let n = domain.size();
    check_inputs(n, &a, &b, &c)?;
    let eval_domain = domain.evaluation_domain()?;
    let coset = eval_domain
        .get_coset(domain.multiplicative_generator)
        .ok_or_else(|| ProverError::invariant(Stage::HComputation, "invalid coset offset"))?;
    let den = domain.coset_denominator(domain.multiplicative_generator)?;

    let to_coset = |values: &mut Vec<F>| {
        values.resize(n, F::ZERO);
        eval_domain.ifft_in_place(values);
        coset.fft_in_place(values);
    };
    rayon::join(
        || to_coset(&mut a),
        || rayon::join(|| to_coset(&mut b), || to_coset(&mut c)),
    );

    a.iter_mut()
        .zip(b.iter().zip(&c))
        .for_each(|(a, (b, c))| *a = (*a * b - c) * den);
    coset.ifft_in_place(&mut a);
    Ok(a)
}

/// Upload one witness vector and bring it to evaluations on the coset, in natural order
fn upload_to_coset<F: FftField + DeviceRepr>(
    values: Vec<F>,
    ntt: &DeviceNttDomain<F>,
    stream: &Stream,
) -> zk_device_backend::Result<DeviceVec<F>> {
    let mut buf = DeviceVec::new_zeroed(ntt.size(), stream.device())?;
    buf.copy_from_host_async(&values, stream)?;
    drop(values);
    from_montgomery_async(&mut buf, stream)?;
    ntt_async(
        &mut buf,
        ntt,
        NttConfig {
            direction: NttDirection::Inverse,
            ordering: Ordering::NR,
            coset: false,
        },
        stream,
    )?;
    ntt_async(
        &mut buf,
        ntt,
        NttConfig {
            direction: NttDirection::Forward,
            ordering: Ordering::RN,
            coset: true,
        },
        stream,
    )?;
    Ok(buf)
}

/// Device path, on the coset of the primitive `2n`-th root of unity
///
/// A, B and C are transformed concurrently on three streams of `device`. The host vectors are
/// dropped as soon as their copy is enqueued. The result stays on the device, in standard form,
/// and is fully computed when this function returns.
pub(crate) fn compute_h_device<F: FftField + DeviceRepr>(
    ntt: &DeviceNttDomain<F>,
    den: &DeviceVec<F>,
    a: Vec<F>,
    b: Vec<F>,
    c: Vec<F>,
    device: &Device,
) -> Result<DeviceVec<F>, ProverError> {
    check_inputs(ntt.size(), &a, &b, &c)?;
    let stage = Stage::HComputation;
    let (stream_a, stream_b, stream_c) = (
        device.create_stream(),
        device.create_stream(),
        device.create_stream(),
    );

    let mut a = upload_to_coset(a, ntt, &stream_a).stage(stage)?;
    let b = upload_to_coset(b, ntt, &stream_b).stage(stage)?;
    let c = upload_to_coset(c, ntt, &stream_c).stage(stage)?;
    stream_b.synchronize().stage(stage)?;
    stream_c.synchronize().stage(stage)?;

    mul_assign_async(&mut a, &b, &stream_a).stage(stage)?;
    sub_assign_async(&mut a, &c, &stream_a).stage(stage)?;
    mul_assign_async(&mut a, den, &stream_a).stage(stage)?;
    ntt_async(
        &mut a,
        ntt,
        NttConfig {
            direction: NttDirection::Inverse,
            ordering: Ordering::NN,
            coset: true,
        },
        &stream_a,
    )
    .stage(stage)?;
    b.free_async(&stream_a).stage(stage)?;
    c.free_async(&stream_a).stage(stage)?;
    stream_a.synchronize().stage(stage)?;
    Ok(a)
}
