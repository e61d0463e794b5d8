//! Verification authority: typed claims, evidence checks, and rework.

mod authority;
mod claims;

pub use authority::{TaskVerification, VerificationAuthority};
pub use claims::{
    Claim, ClaimKind, Discrepancy, Evidence, EvidenceSource, ReworkOrder, VerificationRecord,
    VerificationState,
};
