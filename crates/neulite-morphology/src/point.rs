// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Skeleton point types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};

/// Compartment id inside one skeleton
pub type CompartmentId = u32;

/// SWC structure identifier of a point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectionType {
    Soma,
    Axon,
    Basal,
    Apical,
    /// Any other SWC type code, kept so it can be written back unchanged
    Other(i32),
}

impl SectionType {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => SectionType::Soma,
            2 => SectionType::Axon,
            3 => SectionType::Basal,
            4 => SectionType::Apical,
            other => SectionType::Other(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            SectionType::Soma => 1,
            SectionType::Axon => 2,
            SectionType::Basal => 3,
            SectionType::Apical => 4,
            SectionType::Other(code) => code,
        }
    }

    /// Section name used by edge-type `target_sections` (`somatic`, `axon`, `basal`, `apical`)
    pub fn from_section_name(name: &str) -> Option<Self> {
        match name {
            "somatic" => Some(SectionType::Soma),
            "axon" => Some(SectionType::Axon),
            "basal" => Some(SectionType::Basal),
            "apical" => Some(SectionType::Apical),
            _ => None,
        }
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// 3-D position in micrometres
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Position) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Position {
    type Output = Position;

    fn mul(self, rhs: f64) -> Position {
        Position::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// One row of a skeleton
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompartmentPoint {
    pub id: CompartmentId,
    pub section: SectionType,
    pub position: Position,
    pub radius: f64,
    /// `None` for the root
    pub parent: Option<CompartmentId>,
}

impl CompartmentPoint {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}
