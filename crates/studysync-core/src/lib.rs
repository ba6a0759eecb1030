pub mod chroma_client;
pub mod inspector;
