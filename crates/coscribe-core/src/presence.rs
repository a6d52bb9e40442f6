//! Participant identity and cursors.

use crate::camera::Camera;
use crate::geometry::Point;
use crate::registry::AuthorId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Palette user colors are picked from.
pub const USER_COLORS: [&str; 30] = [
    "#FF5733", "#33FF57", "#3357FF", "#FF33A1", "#A133FF", "#57FF33", "#33A1FF", "#FF8C33", "#8C33FF", "#33FF8C",
    "#FF3333", "#33FFFF", "#FF33FF", "#FFFF33", "#33FF33", "#337FFF", "#7F33FF", "#FF7F33", "#7FFF33", "#33FF7F",
    "#FF3366", "#3366FF", "#66FF33", "#FF6633", "#6633FF", "#33FF66", "#66FF66", "#6666FF", "#FF9966", "#6699FF",
];

/// Stable palette color for a user id (FNV-1a over the id bytes).
pub fn color_for(user_id: &str) -> &'static str {
    let hash = user_id
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3));
    USER_COLORS[(hash % USER_COLORS.len() as u64) as usize]
}

/// Identity shown next to a participant's cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: AuthorId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub color: String,
}

impl UserInfo {
    /// User with the palette color derived from `id`.
    pub fn new(id: impl Into<AuthorId>, username: Option<String>) -> Self {
        let id = id.into();
        let color = color_for(&id).to_string();
        Self { id, username, color }
    }

    /// User with a fresh random id.
    pub fn generate(username: Option<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), username)
    }

    /// Name to show, falling back to a short form of the id.
    pub fn display_name(&self) -> &str {
        match self.username.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => self.id.get(..8).unwrap_or(&self.id),
        }
    }
}

/// Transient pointer position of one participant, in world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub user: UserInfo,
    pub position: Point,
}

impl Cursor {
    pub fn new(user: UserInfo) -> Self {
        Self {
            user,
            position: Point::ZERO,
        }
    }

    /// Where the cursor shows up on screen under the logical camera.
    pub fn screen_position(&self, camera: &Camera) -> Point {
        camera.world_to_screen(self.position)
    }
}
