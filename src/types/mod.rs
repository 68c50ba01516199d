pub(crate) mod response;
pub(crate) mod token;
