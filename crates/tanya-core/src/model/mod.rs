mod message;
mod role;
mod session;

pub use message::*;
pub use role::*;
pub use session::*;

#[cfg(test)]
mod tests;
