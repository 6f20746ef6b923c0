//! Two-slot presentation buffer for cross-fading the three-image display.
//!
//! Exactly two tiles exist. Every [`TileAnimator::update`] flips which one is
//! incoming; the other fades out and is emptied by [`TileAnimator::settle`].
//! Render consumers see whole [`TileBoard`] snapshots through a watch
//! channel, never a half-updated tile.

use crate::catalog::stimulus_key;
use crate::error::EngineError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures_util::future;
use picword_cache::Atom;
use picword_core::{Direction, TileStack, TileStyle};
use rand::seq::IndexedRandom;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Size of the tile color palette; color 0 is the neutral blank.
pub const COLOR_COUNT: u8 = 16;
pub const NEUTRAL_COLOR: u8 = 0;

/// Base64 text of one image file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedImage(String);

impl EncodedImage {
    pub fn encode(bytes: &[u8]) -> Self {
        Self(STANDARD.encode(bytes))
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub color: u8,
    pub stack: TileStack,
    pub direction: Direction,
    pub style: TileStyle,
    pub image_src: Option<Arc<[EncodedImage; 3]>>,
    pub names: Option<[Atom; 3]>,
    pub active: bool,
}

impl Tile {
    fn new(stack: TileStack, direction: Direction, style: TileStyle) -> Self {
        Self {
            color: NEUTRAL_COLOR,
            stack,
            direction,
            style,
            image_src: None,
            names: None,
            active: false,
        }
    }
}

/// Snapshot of both tiles.
#[derive(Debug, Clone)]
pub struct TileBoard {
    pub tiles: [Tile; 2],
    pub incoming: usize,
    /// True from an update until the matching settle.
    pub transition: bool,
    pub changed_at: Instant,
}

impl TileBoard {
    pub fn incoming(&self) -> &Tile {
        &self.tiles[self.incoming]
    }

    pub fn outgoing(&self) -> &Tile {
        &self.tiles[1 - self.incoming]
    }
}

impl Default for TileBoard {
    fn default() -> Self {
        Self {
            tiles: [
                Tile::new(TileStack::Back, Direction::Top, TileStyle::Out),
                Tile::new(TileStack::Front, Direction::Left, TileStyle::In),
            ],
            incoming: 0,
            transition: false,
            changed_at: Instant::now(),
        }
    }
}

pub struct TileAnimator {
    board: TileBoard,
    publisher: watch::Sender<TileBoard>,
}

impl TileAnimator {
    pub fn new() -> Self {
        let board = TileBoard::default();
        let (publisher, _) = watch::channel(board.clone());
        Self { board, publisher }
    }

    pub fn subscribe(&self) -> watch::Receiver<TileBoard> {
        self.publisher.subscribe()
    }

    pub fn board(&self) -> &TileBoard {
        &self.board
    }

    pub fn incoming(&self) -> &Tile {
        self.board.incoming()
    }

    pub fn outgoing(&self) -> &Tile {
        self.board.outgoing()
    }

    pub fn in_transition(&self) -> bool {
        self.board.transition
    }

    /// Swaps the tiles, showing `images` on the new incoming tile, or
    /// blanking it when `images` is `None`.
    ///
    /// Image files are read concurrently and placed by index, so the
    /// incoming tile's `names` follow the order of `images` regardless of
    /// which read finishes first.
    pub async fn update<R: Rng + ?Sized>(
        &mut self,
        images: Option<&[PathBuf; 3]>,
        rng: &mut R,
    ) -> Result<(), EngineError> {
        let loaded = match images {
            Some(paths) => Some(load_images(paths).await?),
            None => None,
        };

        let board = &mut self.board;
        board.incoming = 1 - board.incoming;
        let incoming = board.incoming;
        let outgoing = 1 - incoming;

        let picked = rand::seq::index::sample(rng, Direction::ALL.len(), 2);
        let (dir_in, dir_out) = (Direction::ALL[picked.index(0)], Direction::ALL[picked.index(1)]);

        let outgoing_color = board.tiles[outgoing].color;
        let tile = &mut board.tiles[incoming];
        match loaded {
            Some((names, sources)) => {
                tile.color = pick_color(outgoing_color, rng);
                tile.image_src = Some(Arc::new(sources));
                tile.names = Some(names);
                tile.active = true;
            }
            None => {
                tile.color = NEUTRAL_COLOR;
                tile.image_src = None;
                tile.names = None;
                tile.active = false;
            }
        }
        tile.style = TileStyle::In;
        tile.direction = dir_in;

        let other = &mut board.tiles[outgoing];
        other.style = TileStyle::Out;
        other.direction = dir_out;

        board.transition = true;
        board.changed_at = Instant::now();
        debug!(
            incoming,
            color = board.tiles[incoming].color,
            names = ?board.tiles[incoming].names,
            "tiles swapped"
        );
        self.publish();
        Ok(())
    }

    /// Ends the running transition and frees the outgoing tile's images.
    pub fn settle(&mut self) {
        let outgoing = 1 - self.board.incoming;
        self.board.tiles[outgoing].image_src = None;
        self.board.transition = false;
        self.publish();
    }

    fn publish(&self) {
        self.publisher.send_replace(self.board.clone());
    }
}

impl Default for TileAnimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Uniform pick from the palette, never the neutral color and never
/// `exclude`.
fn pick_color<R: Rng + ?Sized>(exclude: u8, rng: &mut R) -> u8 {
    let candidates: Vec<u8> = (1..COLOR_COUNT).filter(|&c| c != exclude).collect();
    candidates.choose(rng).copied().unwrap_or(1)
}

async fn load_images(
    paths: &[PathBuf; 3],
) -> Result<([Atom; 3], [EncodedImage; 3]), EngineError> {
    let [a, b, c] = paths.each_ref().map(tokio::fs::read);
    let (a, b, c) = future::join3(a, b, c).await;

    let mut sources: [EncodedImage; 3] = Default::default();
    for ((slot, path), bytes) in sources.iter_mut().zip(paths).zip([a, b, c]) {
        let bytes = bytes.map_err(|source| EngineError::ImageRead {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), bytes = bytes.len(), "image loaded");
        *slot = EncodedImage::encode(&bytes);
    }

    let names = paths
        .each_ref()
        .map(|path| Atom::from(stimulus_key(path).unwrap_or_default()));
    Ok((names, sources))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::fs;
    use std::path::Path;

    fn images(dir: &Path, names: [&str; 3]) -> [PathBuf; 3] {
        names.map(|name| {
            let path = dir.join(format!("{name}.png"));
            fs::write(&path, name.as_bytes()).unwrap();
            path
        })
    }

    #[tokio::test]
    async fn update_fills_incoming_tile_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        let paths = images(dir.path(), ["dog", "bird", "cat"]);
        let mut animator = TileAnimator::new();
        let mut rng = StdRng::seed_from_u64(5);

        animator.update(Some(&paths), &mut rng).await.unwrap();

        let tile = animator.incoming();
        assert_eq!(
            tile.names,
            Some([Atom::from("dog"), Atom::from("bird"), Atom::from("cat")])
        );
        let sources = tile.image_src.as_ref().unwrap();
        assert_eq!(sources[1].decode().unwrap(), b"bird");
        assert!(tile.active);
        assert_eq!(tile.style, TileStyle::In);
        assert_eq!(animator.outgoing().style, TileStyle::Out);
        assert!(animator.in_transition());
    }

    #[tokio::test]
    async fn consecutive_updates_never_repeat_color_or_direction() {
        let dir = tempfile::tempdir().unwrap();
        let paths = images(dir.path(), ["a", "b", "c"]);
        let mut animator = TileAnimator::new();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..200 {
            animator.update(Some(&paths), &mut rng).await.unwrap();
            let board = animator.board();
            assert_ne!(board.incoming().color, board.outgoing().color);
            assert_ne!(board.incoming().color, NEUTRAL_COLOR);
            assert!(board.incoming().color < COLOR_COUNT);
            assert_ne!(board.incoming().direction, board.outgoing().direction);
            animator.settle();
        }
    }

    #[tokio::test]
    async fn incoming_index_flips_every_update() {
        let mut animator = TileAnimator::new();
        let mut rng = StdRng::seed_from_u64(1);
        let start = animator.board().incoming;
        animator.update(None, &mut rng).await.unwrap();
        assert_eq!(animator.board().incoming, 1 - start);
        animator.update(None, &mut rng).await.unwrap();
        assert_eq!(animator.board().incoming, start);
    }

    #[tokio::test]
    async fn blank_update_clears_the_incoming_tile() {
        let dir = tempfile::tempdir().unwrap();
        let paths = images(dir.path(), ["a", "b", "c"]);
        let mut animator = TileAnimator::new();
        let mut rng = StdRng::seed_from_u64(9);

        animator.update(Some(&paths), &mut rng).await.unwrap();
        animator.settle();
        animator.update(Some(&paths), &mut rng).await.unwrap();
        animator.settle();
        animator.update(None, &mut rng).await.unwrap();

        let tile = animator.incoming();
        assert_eq!(tile.color, NEUTRAL_COLOR);
        assert_eq!(tile.image_src, None);
        assert_eq!(tile.names, None);
        assert!(!tile.active);
        assert_ne!(tile.direction, animator.outgoing().direction);
    }

    #[tokio::test]
    async fn settle_frees_only_the_outgoing_tile() {
        let dir = tempfile::tempdir().unwrap();
        let paths = images(dir.path(), ["a", "b", "c"]);
        let mut animator = TileAnimator::new();
        let mut rng = StdRng::seed_from_u64(2);
        let board = animator.subscribe();

        animator.update(Some(&paths), &mut rng).await.unwrap();
        animator.settle();
        animator.update(Some(&paths), &mut rng).await.unwrap();
        assert!(animator.outgoing().image_src.is_some());

        animator.settle();
        assert!(animator.outgoing().image_src.is_none());
        assert!(animator.incoming().image_src.is_some());
        assert!(!animator.in_transition());

        let seen = board.borrow();
        assert!(!seen.transition);
        assert_eq!(seen.incoming, animator.board().incoming);
    }

    #[tokio::test]
    async fn unreadable_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = images(dir.path(), ["a", "b", "c"]);
        paths[2] = dir.path().join("gone.png");
        let mut animator = TileAnimator::new();

        let err = animator
            .update(Some(&paths), &mut StdRng::seed_from_u64(0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ImageRead { .. }));
        assert!(!animator.in_transition());
    }
}
