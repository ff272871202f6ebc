mod build;
mod summary;
