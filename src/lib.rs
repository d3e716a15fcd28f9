// src/lib.rs - Hand-gesture control for a 6-axis robot arm
//
// Per frame: landmarks → pinch tracking + finger count → quantized joint
// adjustment → joint snapshot sent to the controller and confirmed.

pub mod config;
pub mod data;
pub mod joints;
pub mod landmarks;
pub mod mapper;
pub mod pipeline;
pub mod protocol;
pub mod tracking;
