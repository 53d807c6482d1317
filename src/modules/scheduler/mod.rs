pub mod dispatcher;
pub mod model;
pub mod periodic;
#[cfg(test)]
mod tests;
