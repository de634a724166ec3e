pub mod image_store;
