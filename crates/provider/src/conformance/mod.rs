//! Cross-provider conformance harness.
//!
//! A single suite collection runnable against *any* [`DatabaseProvider`]
//! implementation, certifying interface compliance before a backend is
//! trusted with production traffic: connection lifecycle, schema
//! integrity, CRUD, transactions, tenant isolation, role-based access,
//! composite business workflows, performance bounds, and recovery
//! behavior, plus auth/storage suites when the provider exposes those
//! surfaces.
//!
//! # Example
//!
//! ```ignore
//! let provider = create_database_provider(config).await?;
//! let stack = create_security_provider(SecurityMode::Hybrid, &provider, SecurityConfig::default());
//!
//! let report = ConformanceRunner::new(provider)
//!     .with_security(stack.security)
//!     .run_all()
//!     .await;
//!
//! println!("{report}");
//! assert!(report.passed());
//! ```
//!
//! [`DatabaseProvider`]: crate::core::DatabaseProvider

mod report;
mod runner;

pub use report::{CaseReport, ConformanceReport, Outcome, SuiteReport};
pub use runner::{ConformanceOptions, ConformanceRunner};
