//! Reference handlers: `ping`, `pi` and `fibonaqi`.
//!
//! These are the workloads the framework ships with. `fibonaqi` is naive
//! exponential recursion on purpose; it is a CPU benchmark, not a Fibonacci
//! service.

use forkrpc_common::{ForkrpcError, Response, Result};
use serde_json::{json, Value};

use crate::dispatcher::Handler;

/// Largest `fibonaqi` argument whose result fits in an `i64`
pub const MAX_FIBONAQI_N: i64 = 92;

/// `ping(message) -> ("pong", message)`
#[derive(Debug, Clone, Copy, Default)]
pub struct Ping;

impl Handler for Ping {
    fn handle(&self, params: Value) -> Result<Response> {
        Ok(Response::new("pong", params))
    }
}

/// `pi(n) -> ("pi_r", sqrt(8 * sum_{i=0..=n} 1/(2i+1)^2))`
#[derive(Debug, Clone, Copy, Default)]
pub struct Pi;

impl Handler for Pi {
    fn handle(&self, params: Value) -> Result<Response> {
        let n = integer_param("pi", &params)?;
        Ok(Response::new("pi_r", json!(approximate_pi(n))))
    }
}

/// `fibonaqi(n) -> ("fibonaqi", fib(n))`
#[derive(Debug, Clone, Copy, Default)]
pub struct Fibonaqi;

impl Handler for Fibonaqi {
    fn handle(&self, params: Value) -> Result<Response> {
        let n = integer_param("fibonaqi", &params)?;
        if n > MAX_FIBONAQI_N {
            return Err(ForkrpcError::InvalidRequest(format!(
                "fibonaqi({}) overflows; max is {}",
                n, MAX_FIBONAQI_N
            )));
        }
        Ok(Response::new("fibonaqi", json!(fibonaqi(n))))
    }
}

fn integer_param(method: &str, params: &Value) -> Result<i64> {
    params.as_i64().ok_or_else(|| {
        ForkrpcError::InvalidRequest(format!("{} expects an integer, got {}", method, params))
    })
}

/// Approximates pi from the first `n + 1` terms of the odd reciprocal squares.
///
/// A negative `n` sums no terms and yields `0.0`.
pub fn approximate_pi(n: i64) -> f64 {
    let mut sum = 0.0;
    for i in 0..=n {
        let odd = 2.0 * i as f64 + 1.0;
        sum += 1.0 / odd / odd;
    }
    (8.0 * sum).sqrt()
}

/// Naive recursive Fibonacci. Arguments below 2 are returned unchanged.
pub fn fibonaqi(n: i64) -> i64 {
    if n <= 1 {
        return n;
    }
    fibonaqi(n - 1) + fibonaqi(n - 2)
}
