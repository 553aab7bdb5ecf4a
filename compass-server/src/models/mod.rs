//! Domain models with validation at construction
//!
//! All request input is validated when creating these types.
//! Invalid input returns ValidationError, not panic.

pub mod batch;
pub mod client;
pub mod donation;
pub mod donor;
pub mod pagination;
pub mod period;
pub mod user;
pub mod validation;

pub use batch::{batch_name, BatchStatus};
pub use client::{client_name, ClientCode};
pub use donation::{DonationFields, DonationInput, DonationPatch};
pub use donor::{DonorFields, DonorInput, DonorPatch};
pub use pagination::{Paginated, Pagination, PaginationParams};
pub use period::{DateRange, PeriodStatus};
pub use user::Role;
pub use validation::ValidationError;
