//! Custom-domain ownership verification: DNS TXT challenges and the
//! resolver clients that check them.

pub mod dns;
pub mod verifier;

pub use dns::{DnsLookupError, DnsResolver, DohClient, StaticDnsTable};
pub use verifier::{
    DomainVerification, DomainVerifier, VerificationChallenge, VerificationOutcome,
};
