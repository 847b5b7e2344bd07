mod store_accessor;

pub use store_accessor::StoreAccessor;
