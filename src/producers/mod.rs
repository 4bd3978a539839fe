//! Mask producer implementations
//!
//! - [`PrecomputedMaskProducer`]: serves masks and boxes produced out of
//!   process, from memory or from files
//! - [`test_utils::MockMaskProducer`]: scripted producer with call history

pub mod precomputed;
pub mod test_utils;

pub use precomputed::PrecomputedMaskProducer;
