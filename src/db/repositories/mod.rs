pub mod ballot_repository;
pub mod proxy_repository;
pub mod shareholder_repository;
pub mod subject_repository;

pub use ballot_repository::*;
pub use proxy_repository::*;
pub use shareholder_repository::*;
pub use subject_repository::*;
