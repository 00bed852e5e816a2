//! Challenge detection and solution injection.
//!
//! The platform renders its interactive challenge differently across
//! experiments, locales, and rollouts, so nothing in here trusts a single
//! selector: detection ORs several independent signal channels and
//! injection attempts several activation strategies, each one fault
//! tolerant on its own.

mod detector;
mod injector;

pub use detector::{find_site_key, ChallengeDetector};
pub use injector::{InjectionReport, SolutionInjector};
