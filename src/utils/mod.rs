pub mod blob_id;
