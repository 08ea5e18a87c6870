pub(crate) mod callback;
pub(crate) mod utils;

#[cfg(test)]
pub(crate) mod stub;
