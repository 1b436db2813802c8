pub mod constants;
pub mod validation;
pub mod worker_pool;

#[cfg(test)]
pub mod test_helpers;
