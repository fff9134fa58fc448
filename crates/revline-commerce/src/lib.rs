//! Headless-commerce adapter for the Revline storefront.
//!
//! Creates carts against the commerce backend's GraphQL API and hands back a
//! checkout URL rewritten to the canonical checkout subdomain. Payment itself
//! happens on the hosted checkout page, outside this codebase.

mod cart;
mod checkout_url;

pub mod error;

pub use cart::{
  CartAttribute, CartInput, CartLine, CommerceClient, CommerceConfig, CreatedCart,
};
pub use checkout_url::rewrite_checkout_url;
pub use error::{Error, Result};
