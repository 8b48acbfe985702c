pub mod coordinator;
pub mod dual_write;
pub mod tracking;
pub mod transitions;

#[cfg(test)]
mod tests;
