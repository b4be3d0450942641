/// Entry standing for "no image" in an image list.
pub const NO_IMAGE_SENTINEL: &str = "image0";

/// Wraps `index + delta` into `0..count`. `count` must be non-zero.
pub fn wrap_index(index: usize, delta: isize, count: usize) -> usize {
    let count = count as isize;
    ((index as isize % count + delta % count + count) % count) as usize
}

/// What the carousel currently shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageRef<'a> {
    Image(&'a str),
    Placeholder,
}

/// Circular index over an image list, shared by popups and the full-size viewer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Carousel {
    images: Vec<String>,
    index: usize,
}

impl Carousel {
    pub fn new(images: Vec<String>) -> Self {
        Self { images, index: 0 }
    }

    /// Starts at `index`, wrapped into range.
    pub fn with_index(images: Vec<String>, index: usize) -> Self {
        let index = if images.is_empty() {
            0
        } else {
            index % images.len()
        };
        Self { images, index }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// True when the list holds displayable images, not just the sentinel.
    pub fn has_real_images(&self) -> bool {
        self.images
            .first()
            .map_or(false, |first| first != NO_IMAGE_SENTINEL)
    }

    pub fn next(&mut self) -> ImageRef<'_> {
        self.step(1)
    }

    pub fn previous(&mut self) -> ImageRef<'_> {
        self.step(-1)
    }

    fn step(&mut self, delta: isize) -> ImageRef<'_> {
        if !self.images.is_empty() {
            self.index = wrap_index(self.index, delta, self.images.len());
        }
        self.current()
    }

    pub fn current(&self) -> ImageRef<'_> {
        if !self.has_real_images() {
            return ImageRef::Placeholder;
        }
        match self.images.get(self.index) {
            Some(image) if image != NO_IMAGE_SENTINEL => ImageRef::Image(image),
            _ => ImageRef::Placeholder,
        }
    }
}
