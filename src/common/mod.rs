pub mod registry;
pub mod util;

#[cfg(test)]
pub(crate) mod fake;
