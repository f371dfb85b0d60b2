pub(crate) mod books;
pub(crate) mod chat;
