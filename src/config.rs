//! Configuration loading for the derby car
//!
//! All configuration is supplied through named environment parameters and
//! validated once at startup. A missing or unparsable value is fatal before
//! the dispatch loop ever starts.

use crate::{CarError, Result};
use serde::Serialize;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize)]
pub struct CarConfig {
    /// Cloud project identity
    pub project: String,
    /// Logical car identity, reported in every telemetry snapshot
    pub car_id: String,
    /// Initial ball color assigned to this car
    pub car_color: String,
    /// Device registry this car belongs to
    pub registry: String,
    /// Device identity within the registry
    pub device_id: String,
    pub region: String,
    /// Object-storage bucket for captured camera images
    pub camera_bucket: String,
    /// Topic telemetry snapshots are published to
    pub sensor_topic: String,
    /// True when the camera is mounted upright (no image flip needed)
    pub camera_upright: bool,
    pub horizontal_resolution: u32,
    pub vertical_resolution: u32,
    /// Distance below which an obstacle is considered blocking (mm)
    pub barrier_dampening_mm: i64,
}

impl CarConfig {
    /// Load and validate configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an injected lookup function
    ///
    /// The lookup indirection keeps validation testable without mutating the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            project: required(&lookup, "PROJECT")?,
            car_id: required(&lookup, "CAR_ID")?,
            car_color: required(&lookup, "CAR_COLOR")?,
            registry: required(&lookup, "IOT_CORE_REGISTRY")?,
            device_id: required(&lookup, "IOT_CORE_DEVICE_ID")?,
            region: required(&lookup, "REGION")?,
            camera_bucket: required(&lookup, "CAR_CAMERA_BUCKET")?,
            sensor_topic: required(&lookup, "SENSOR_TOPIC")?,
            camera_upright: required(&lookup, "CAR_CAMERA_NORMAL")? == "1",
            horizontal_resolution: required_parsed(&lookup, "HORIZONTAL_RESOLUTION_PIXELS")?,
            vertical_resolution: required_parsed(&lookup, "VERTICAL_RESOLUTION_PIXELS")?,
            barrier_dampening_mm: required_parsed(&lookup, "BARRIER_DAMPENING")?,
        })
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).ok_or_else(|| {
        CarError::Config(format!("environment parameter '{}' is not set", name))
    })
}

fn required_parsed<F, T>(lookup: &F, name: &str) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = required(lookup, name)?;
    raw.parse().map_err(|e| {
        CarError::Config(format!("environment parameter '{}' = '{}': {}", name, raw, e))
    })
}
