pub mod ask;
pub mod guild;
pub mod help;
pub mod ingest;
pub mod purge;
pub mod roles;
