//! Schnorr-style zero-knowledge proofs, implemented as building blocks for the channel proofs.
//!
//! Each proof is built in two phases. A builder runs the commitment phase, the caller gathers
//! every builder into a [`ChallengeBuilder`] to derive a Fiat-Shamir [`Challenge`], and each
//! builder then runs its response phase with that shared challenge. Sharing commitment scalars
//! across builders expresses equality and linear relations between the hidden values.

mod challenge;
mod commitment;
mod range;
mod signature;

pub use self::{challenge::*, commitment::*, range::*, signature::*};
