//! Atlas pages: one GPU texture plus its block allocator.

use log::trace;

use crate::graphics::bitmap::Bitmap;
use crate::graphics::block_alloc::{Block, BlockAllocator};
use crate::graphics::draw_op::UvRect;
use crate::graphics::renderer::{Renderer, TextureId};
use crate::graphics::GraphicsError;

/// One square texture page shared by many chunks. The page mediates all
/// GPU writes; chunk handles only request uploads through it.
#[derive(Debug)]
pub struct Texture {
    id: TextureId,
    size: u32,
    retro: bool,
    allocator: BlockAllocator,
    num_chunks: usize,
}

impl Texture {
    /// Create a page of `size` x `size` pixels. A backend failure here is
    /// fatal to the caller since rendering cannot proceed without pages.
    pub fn new(renderer: &mut dyn Renderer, size: u32, retro: bool) -> Result<Self, GraphicsError> {
        let id = renderer.create_texture(size, retro)?;
        Ok(Self {
            id,
            size,
            retro,
            allocator: BlockAllocator::new(size),
            num_chunks: 0,
        })
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Whether this page uses nearest-neighbor filtering. Images only
    /// share a page with matching filtering.
    pub fn retro(&self) -> bool {
        self.retro
    }

    /// Number of live chunks currently referencing this page.
    pub fn num_chunks(&self) -> usize {
        self.num_chunks
    }

    /// Try to place `padded` (an already border-padded bitmap) on this
    /// page. On success the pixels are uploaded and the padded block is
    /// returned; on failure nothing is uploaded and the caller moves on to
    /// the next page.
    pub fn try_alloc(&mut self, renderer: &mut dyn Renderer, padded: &Bitmap) -> Option<Block> {
        let block = self.allocator.alloc(padded.width(), padded.height())?;
        renderer.upload(self.id, block.left, block.top, padded);
        self.num_chunks += 1;
        trace!(
            "allocated {}x{} at ({}, {}) on page {:?}",
            block.width,
            block.height,
            block.left,
            block.top,
            self.id
        );
        Some(block)
    }

    /// Return a chunk's padded block to the allocator.
    pub fn free_block(&mut self, block: &Block) {
        self.allocator.free(block.left, block.top, block.width, block.height);
        self.num_chunks = self.num_chunks.saturating_sub(1);
    }

    /// Read back a sub-rectangle of the page. Reads the whole page from
    /// the backend; inspection/export only, never the hot path.
    pub fn to_bitmap(
        &self,
        renderer: &mut dyn Renderer,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<Bitmap, GraphicsError> {
        let page = renderer.read_texture(self.id);
        page.crop(x, y, width, height)
    }

    /// Normalized texture coordinates of a pixel rectangle on this page.
    pub fn uv_rect(&self, x: u32, y: u32, width: u32, height: u32) -> UvRect {
        let size = self.size as f32;
        UvRect {
            left: x as f32 / size,
            top: y as f32 / size,
            right: (x + width) as f32 / size,
            bottom: (y + height) as f32 / size,
        }
    }
}
