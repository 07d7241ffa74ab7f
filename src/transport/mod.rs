/// Filesystem helpers: atomic JSON writes, archive unpacking, table discovery.
pub mod fs;
/// Blocking HTTP implementation of `SpendingApi`.
pub mod http;
