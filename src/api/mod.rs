pub(crate) mod errors;
pub(crate) mod feedback;
pub(crate) mod handlers;
pub(crate) mod problems;
pub(crate) mod router;
pub(crate) mod solutions;
pub(crate) mod submissions;
