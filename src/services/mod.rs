pub mod anonymizer;
pub mod budget;
pub mod credentials;
pub mod estimator;
pub mod extractor;
pub mod pricing;
pub mod reconciler;
pub mod report_writer;

pub use anonymizer::IdentityAnonymizer;
pub use budget::{Budget, BudgetLedger, Impact, ItemSource};
pub use credentials::{CredentialStore, EnvCredentialStore};
pub use extractor::{ContentExtractor, PlainTextExtractor};
pub use pricing::{PricingSource, StaticPricing};
pub use reconciler::SubmissionReconciler;
pub use report_writer::ReportWriter;
