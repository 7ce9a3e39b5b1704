pub mod error;
pub mod store;
pub mod routine;
pub mod autocurate;
pub mod export;

#[cfg(test)]
mod fixture;
