//! Types and sample-domain kernels shared between the codec engines.

pub mod prediction;
/// Inverse DCT transform kernels.
pub mod transform;
pub mod types;
