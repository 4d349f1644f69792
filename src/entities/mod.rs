pub mod allocation;
pub mod courier;
pub mod order;
pub mod order_issue;
pub mod order_item;
pub mod product;
