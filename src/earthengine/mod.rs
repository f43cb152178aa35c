mod client;
pub mod expression;

pub use client::EarthEngine;
pub use expression::{Expression, Node};

use anyhow::Result;
use serde_json::Value;

/// Evaluates an expression graph remotely and returns the realised value.
pub trait ComputeService {
    async fn compute(&self, expression: &Expression) -> Result<Value>;
}
