pub mod call;
pub mod part;
pub mod quote;
