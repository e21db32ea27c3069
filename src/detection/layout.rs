/// Table layout
///
/// Regions are relative to the captured frame (0.0-1.0 on both axes) so one
/// layout works for any window size.
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Relative rectangle [x, y, width, height]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl RelRect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_array(arr: [f32; 4]) -> Self {
        Self::new(arr[0], arr[1], arr[2], arr[3])
    }

    /// Check the rectangle lies inside the unit square and has an area
    pub fn validate(&self) -> Result<(), ValidationError> {
        let inside = self.x >= 0.0
            && self.y >= 0.0
            && self.width > 0.0
            && self.height > 0.0
            && self.x + self.width <= 1.0 + f32::EPSILON
            && self.y + self.height <= 1.0 + f32::EPSILON;
        if inside {
            Ok(())
        } else {
            Err(ValidationError::RegionOutOfBounds {
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
            })
        }
    }

    /// Convert to absolute pixel bounds, clamped to the image
    pub fn to_pixels(&self, image_width: u32, image_height: u32) -> (u32, u32, u32, u32) {
        let x = ((self.x * image_width as f32).floor() as u32).min(image_width.saturating_sub(1));
        let y = ((self.y * image_height as f32).floor() as u32).min(image_height.saturating_sub(1));
        let width = ((self.width * image_width as f32).round() as u32)
            .max(1)
            .min(image_width - x);
        let height = ((self.height * image_height as f32).round() as u32)
            .max(1)
            .min(image_height - y);
        (x, y, width, height)
    }
}

/// Regions belonging to one seat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatLayout {
    pub seat: u8,
    pub name: RelRect,
    pub stack: RelRect,
    pub action: RelRect,
    pub button: RelRect,
    pub timer: RelRect,
}

/// Regions of a whole table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableLayout {
    pub board: RelRect,
    pub hero_cards: RelRect,
    pub pot: RelRect,
    pub side_pots: RelRect,
    pub blinds: RelRect,
    pub seats: Vec<SeatLayout>,
}

impl TableLayout {
    pub fn max_seats(&self) -> u8 {
        self.seats.iter().map(|s| s.seat).max().unwrap_or(0)
    }

    pub fn seat(&self, seat: u8) -> Option<&SeatLayout> {
        self.seats.iter().find(|s| s.seat == seat)
    }

    /// Validate every region
    pub fn validate(&self) -> Result<(), ValidationError> {
        for rect in [
            &self.board,
            &self.hero_cards,
            &self.pot,
            &self.side_pots,
            &self.blinds,
        ] {
            rect.validate()?;
        }
        for seat in &self.seats {
            for rect in [&seat.name, &seat.stack, &seat.action, &seat.button, &seat.timer] {
                rect.validate()?;
            }
        }
        Ok(())
    }

    /// Default 6-max layout, seats clockwise from the bottom (hero) seat
    pub fn six_max() -> Self {
        // Seat anchor points (top-left of the name plate)
        let anchors: [(f32, f32); 6] = [
            (0.42, 0.78),
            (0.06, 0.60),
            (0.06, 0.22),
            (0.42, 0.06),
            (0.78, 0.22),
            (0.78, 0.60),
        ];

        let seats = anchors
            .iter()
            .enumerate()
            .map(|(idx, &(x, y))| SeatLayout {
                seat: idx as u8 + 1,
                name: RelRect::new(x, y, 0.16, 0.04),
                stack: RelRect::new(x, y + 0.04, 0.16, 0.04),
                action: RelRect::new(x, y + 0.08, 0.16, 0.04),
                button: RelRect::new(x + 0.16, y, 0.04, 0.06),
                timer: RelRect::new(x, y + 0.12, 0.16, 0.03),
            })
            .collect();

        Self {
            board: RelRect::new(0.30, 0.40, 0.40, 0.14),
            hero_cards: RelRect::new(0.44, 0.66, 0.12, 0.10),
            pot: RelRect::new(0.40, 0.34, 0.20, 0.05),
            side_pots: RelRect::new(0.30, 0.55, 0.40, 0.04),
            blinds: RelRect::new(0.00, 0.00, 0.30, 0.04),
            seats,
        }
    }
}

impl Default for TableLayout {
    fn default() -> Self {
        Self::six_max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_is_valid() {
        let layout = TableLayout::default();
        assert!(layout.validate().is_ok());
        assert_eq!(layout.max_seats(), 6);
        assert!(layout.seat(4).is_some());
        assert!(layout.seat(7).is_none());
    }

    #[test]
    fn test_region_outside_frame_rejected() {
        let rect = RelRect::new(0.9, 0.1, 0.2, 0.1);
        assert!(rect.validate().is_err());

        let rect = RelRect::new(0.1, 0.1, 0.0, 0.1);
        assert!(rect.validate().is_err());
    }

    #[test]
    fn test_to_pixels_clamps() {
        let rect = RelRect::new(0.5, 0.5, 0.5, 0.5);
        assert_eq!(rect.to_pixels(200, 100), (100, 50, 100, 50));

        let tiny = RelRect::new(0.999, 0.999, 0.001, 0.001);
        let (x, y, w, h) = tiny.to_pixels(10, 10);
        assert_eq!((x, y), (9, 9));
        assert_eq!((w, h), (1, 1));
    }
}
