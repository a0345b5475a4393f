// SPDX-License-Identifier: Apache-2.0

pub mod bottleneck;
pub mod cache;
pub mod characterize;
pub mod classify;
pub mod design;
pub mod liberty;
pub mod netlist;
pub mod optimize;
pub mod timing;
