// Data model: products, purchases, and validator wire types
pub mod product;
pub mod purchase;
pub mod validate;
