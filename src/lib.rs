pub mod app;
pub mod logwatch;
pub mod notify;
pub mod session;

#[cfg(test)]
mod testing;
