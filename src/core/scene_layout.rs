use crate::types::{Resolution, S2Error, S2Result, TileId, TileMetadata, TileRectangle};
use std::collections::HashMap;

/// Aggregate scene geometry of an ortho product.
///
/// Computed once per product open from the resolved tile metadata: the
/// per-resolution scene dimension, the upper-left-most scene origin and the
/// tile ids in matrix-traversal order (row-major, top-left first). Immutable
/// afterwards.
#[derive(Debug, Clone)]
pub struct SceneLayout {
    scene_dimensions: HashMap<Resolution, (usize, usize)>,
    scene_origin: (f64, f64),
    ordered_tile_ids: Vec<TileId>,
    tile_origins: HashMap<TileId, (f64, f64)>,
    tile_dimensions: HashMap<TileId, HashMap<Resolution, (usize, usize)>>,
}

impl SceneLayout {
    /// Build the layout from the full tile list of the metadata header
    pub fn create(tiles: &[TileMetadata]) -> S2Result<SceneLayout> {
        if tiles.is_empty() {
            return Err(S2Error::InvalidFormat("no valid tiles".to_string()));
        }

        // upper-left-most coordinate across all tiles
        let mut origin_x = f64::MAX;
        let mut origin_y = f64::MIN;
        for tile in tiles {
            origin_x = origin_x.min(tile.upper_left_x);
            origin_y = origin_y.max(tile.upper_left_y);
        }

        let mut ordered: Vec<&TileMetadata> = tiles.iter().collect();
        ordered.sort_by(|a, b| {
            b.upper_left_y
                .total_cmp(&a.upper_left_y)
                .then(a.upper_left_x.total_cmp(&b.upper_left_x))
        });

        let mut scene_dimensions: HashMap<Resolution, (usize, usize)> = HashMap::new();
        let mut tile_origins = HashMap::new();
        let mut tile_dimensions = HashMap::new();
        for tile in &ordered {
            tile_origins.insert(tile.id.clone(), (tile.upper_left_x, tile.upper_left_y));
            tile_dimensions.insert(tile.id.clone(), tile.dimensions.clone());
            for resolution in Resolution::VALUES {
                let (tile_width, tile_height) = match tile.dimensions.get(&resolution) {
                    Some(dim) => *dim,
                    None => continue,
                };
                let meters = resolution.meters() as f64;
                let offset_x = ((tile.upper_left_x - origin_x) / meters).round() as i64;
                let offset_y = ((origin_y - tile.upper_left_y) / meters).round() as i64;
                let right = (offset_x + tile_width as i64) as usize;
                let bottom = (offset_y + tile_height as i64) as usize;
                let entry = scene_dimensions.entry(resolution).or_insert((0, 0));
                entry.0 = entry.0.max(right);
                entry.1 = entry.1.max(bottom);
            }
        }

        Ok(SceneLayout {
            scene_dimensions,
            scene_origin: (origin_x, origin_y),
            ordered_tile_ids: ordered.iter().map(|t| t.id.clone()).collect(),
            tile_origins,
            tile_dimensions,
        })
    }

    /// Scene dimension (width, height) in pixels for a resolution
    pub fn scene_dimension(&self, resolution: Resolution) -> Option<(usize, usize)> {
        self.scene_dimensions.get(&resolution).copied()
    }

    /// Geographic coordinate (easting, northing) of scene pixel (0, 0)
    pub fn scene_origin(&self) -> (f64, f64) {
        self.scene_origin
    }

    /// Tile ids in matrix-traversal order: row-major, top-left first
    pub fn ordered_tile_ids(&self) -> &[TileId] {
        &self.ordered_tile_ids
    }

    pub fn tile_count(&self) -> usize {
        self.ordered_tile_ids.len()
    }

    /// Pixel rectangle of a tile in the scene grid at a resolution.
    /// This is the rectangle index consumed by the matrix builder.
    pub fn tile_rectangle(&self, tile_id: &str, resolution: Resolution) -> Option<TileRectangle> {
        let (tile_x, tile_y) = *self.tile_origins.get(tile_id)?;
        let (width, height) = *self.tile_dimensions.get(tile_id)?.get(&resolution)?;
        let meters = resolution.meters() as f64;
        let x = ((tile_x - self.scene_origin.0) / meters).round() as i64;
        let y = ((self.scene_origin.1 - tile_y) / meters).round() as i64;
        Some(TileRectangle::new(x, y, width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(id: &str, upper_left_x: f64, upper_left_y: f64) -> TileMetadata {
        let mut dimensions = HashMap::new();
        dimensions.insert(Resolution::R10M, (100, 100));
        dimensions.insert(Resolution::R20M, (50, 50));
        TileMetadata {
            id: id.to_string(),
            upper_left_x,
            upper_left_y,
            dimensions,
            angles: None,
        }
    }

    #[test]
    fn test_empty_tile_list_fails() {
        let result = SceneLayout::create(&[]);
        assert!(matches!(result, Err(S2Error::InvalidFormat(_))));
    }

    #[test]
    fn test_two_by_two_layout() {
        // 100x100 px tiles at 10m: 1000m spacing, row-major from the north-west
        let tiles = vec![
            tile("se", 301000.0, 4999000.0),
            tile("nw", 300000.0, 5000000.0),
            tile("ne", 301000.0, 5000000.0),
            tile("sw", 300000.0, 4999000.0),
        ];
        let layout = SceneLayout::create(&tiles).unwrap();

        assert_eq!(layout.scene_origin(), (300000.0, 5000000.0));
        assert_eq!(layout.ordered_tile_ids(), &["nw", "ne", "sw", "se"]);
        assert_eq!(layout.scene_dimension(Resolution::R10M), Some((200, 200)));
        assert_eq!(layout.scene_dimension(Resolution::R20M), Some((100, 100)));
        assert_eq!(layout.scene_dimension(Resolution::R60M), None);

        assert_eq!(
            layout.tile_rectangle("nw", Resolution::R10M),
            Some(TileRectangle::new(0, 0, 100, 100))
        );
        assert_eq!(
            layout.tile_rectangle("se", Resolution::R10M),
            Some(TileRectangle::new(100, 100, 100, 100))
        );
        assert_eq!(
            layout.tile_rectangle("se", Resolution::R20M),
            Some(TileRectangle::new(50, 50, 50, 50))
        );
    }

    #[test]
    fn test_single_tile_layout() {
        let tiles = vec![tile("only", 600000.0, 4100000.0)];
        let layout = SceneLayout::create(&tiles).unwrap();
        assert_eq!(layout.scene_dimension(Resolution::R10M), Some((100, 100)));
        assert_eq!(
            layout.tile_rectangle("only", Resolution::R10M),
            Some(TileRectangle::new(0, 0, 100, 100))
        );
    }
}
