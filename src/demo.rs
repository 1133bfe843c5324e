//! Demonstration Call Graphs
//!
//! Two toy resolvers (doubling and squaring) and the compositions that
//! chain them. Running every composition concurrently exercises coalescing
//! across resolvers and re-arming across many rounds.

use crate::{batch::Loader, config::DemoConfig, BatchError, Batcher};
use futures::future::try_join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;

/// Loaders for the two demonstration resolvers
#[derive(Clone)]
pub struct DemoLoaders {
    pub double: Loader<i64, i64>,
    pub square: Loader<i64, i64>,
}

/// Register the doubling and squaring resolvers on `batcher`
///
/// Both simulate backend latency with `resolver_delay_ms` and answer with a key -> value map.
pub fn register(batcher: &Batcher, config: &DemoConfig) -> Result<DemoLoaders, BatchError> {
    let delay = Duration::from_millis(config.resolver_delay_ms);

    let double: Loader<i64, i64> = batcher.register_async("double", move |keys: Vec<i64>| async move {
        sleep(delay).await;
        anyhow::Ok(keys.iter().map(|&x| (x, x + x)).collect::<HashMap<i64, i64>>())
    })?;

    let square: Loader<i64, i64> = batcher.register_async("square", move |keys: Vec<i64>| async move {
        sleep(delay).await;
        anyhow::Ok(keys.iter().map(|&x| (x, x * x)).collect::<HashMap<i64, i64>>())
    })?;

    Ok(DemoLoaders { double, square })
}

pub async fn double_square(loaders: &DemoLoaders, x: i64) -> Result<i64, BatchError> {
    let double = loaders.double.gen(x).await?;
    loaders.square.gen(double).await
}

pub async fn square_double(loaders: &DemoLoaders, x: i64) -> Result<i64, BatchError> {
    let square = loaders.square.gen(x).await?;
    loaders.double.gen(square).await
}

pub async fn triple_double(loaders: &DemoLoaders, x: i64) -> Result<i64, BatchError> {
    let d1 = loaders.double.gen(x).await?;
    let d2 = loaders.double.gen(d1).await?;
    loaders.double.gen(d2).await
}

pub async fn double_square_square_double(loaders: &DemoLoaders, x: i64) -> Result<i64, BatchError> {
    let ds = double_square(loaders, x).await?;
    square_double(loaders, ds).await
}

/// Results of every composition driven by [`run_root`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DemoReport {
    pub square_double: Vec<i64>,
    pub double_square: Vec<i64>,
    pub doubled: Vec<i64>,
    pub squared: Vec<i64>,
    pub triple_double: Vec<i64>,
    pub double_square_square_double: Vec<i64>,
}

impl DemoReport {
    /// What [`run_root`] must produce.
    pub fn expected() -> Self {
        Self {
            square_double: vec![200, 800, 1800],
            double_square: vec![256, 324, 400],
            doubled: vec![2, 4, 6, 8, 10, 12],
            squared: vec![1, 4, 9, 16, 25, 36],
            triple_double: vec![800, 1600, 2400],
            double_square_square_double: vec![7_324_372_512, 1_383_596_163_072, 12_401_036_654_112],
        }
    }
}

/// Drive all compositions concurrently from one task
pub async fn run_root(loaders: &DemoLoaders) -> Result<DemoReport, BatchError> {
    let (square_double, double_square, doubled, squared, triple_double, double_square_square_double) = tokio::try_join!(
        try_join_all([10, 20, 30].map(|x| self::square_double(loaders, x))),
        try_join_all([8, 9, 10].map(|x| self::double_square(loaders, x))),
        loaders.double.genv([1, 2, 3, 4, 5, 6]),
        loaders.square.genv([-1, -2, -3, -4, -5, -6]),
        try_join_all([100, 200, 300].map(|x| self::triple_double(loaders, x))),
        try_join_all([123, 456, 789].map(|x| self::double_square_square_double(loaders, x))),
    )?;

    Ok(DemoReport {
        square_double,
        double_square,
        doubled,
        squared,
        triple_double,
        double_square_square_double,
    })
}
