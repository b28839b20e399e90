//! Immutable 2D primitives used by the render driver.
//!
//! All drawing math is expressed in "surface" coordinates: x grows to the
//! right, y grows downward. Backends that use a different axis convention
//! (PDF) convert at the last moment.

use std::f32::consts::FRAC_PI_2;

use thiserror::Error;

/// Raised when a point would be built from a NaN or infinite coordinate.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid coordinate: {axis} is {value}")]
pub struct InvalidCoordinate {
    pub axis: char,
    pub value: f32,
}

/// A point on the output surface.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    x: f32,
    y: f32,
}

impl Point {
    /// Creates a new point, rejecting non-finite coordinates.
    pub fn new(x: f32, y: f32) -> Result<Self, InvalidCoordinate> {
        if !x.is_finite() {
            return Err(InvalidCoordinate { axis: 'x', value: x });
        }
        if !y.is_finite() {
            return Err(InvalidCoordinate { axis: 'y', value: y });
        }
        Ok(Self { x, y })
    }

    /// Returns the x-coordinate of the point
    pub fn x(self) -> f32 {
        self.x
    }

    /// Returns the y-coordinate of the point
    pub fn y(self) -> f32 {
        self.y
    }

    /// Returns a copy shifted by the given deltas.
    pub fn adjust(self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Returns a copy shifted by `r` along the direction `theta` (radians).
    pub fn polar_adjust(self, r: f32, theta: f32) -> Self {
        Self {
            x: self.x + r * theta.cos(),
            y: self.y + r * theta.sin(),
        }
    }

    /// Calculates the midpoint between this point and another point
    pub fn midpoint(self, other: Point) -> Self {
        Self {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
        }
    }

    /// Angle of the segment from this point to `other`.
    ///
    /// A vertical segment reports `PI/2` regardless of direction, matching
    /// the slope-based convention the arrow layout relies on.
    pub fn angle(self, other: Point) -> f32 {
        let dx = other.x - self.x;
        if dx == 0.0 {
            FRAC_PI_2
        } else {
            ((other.y - self.y) / dx).atan()
        }
    }
}

/// A point remembered together with the (column, tick) pair it was
/// computed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    point: Point,
    column: f32,
    tick: f32,
}

impl Position {
    pub fn new(point: Point, column: f32, tick: f32) -> Self {
        Self {
            point,
            column,
            tick,
        }
    }

    /// The surface point this position resolves to.
    pub fn point(self) -> Point {
        self.point
    }

    /// The (possibly fractional) column this position was derived from.
    pub fn column(self) -> f32 {
        self.column
    }

    /// The (possibly fractional) tick this position was derived from.
    pub fn tick(self) -> f32 {
        self.tick
    }
}
