pub mod attachment;
pub mod body;
pub mod email;
pub mod folder;
#[cfg(test)]
mod tests;
