//! Numerical primitives for the cart-pendulum resonance console.

pub mod dft;
pub mod phase;
pub mod sinefit;
pub mod window;
