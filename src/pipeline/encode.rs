//! Page images: rasterised page → encoded bitmap blob → VLM attachment.
//!
//! A [`PageImage`] is the unit the Page Image Source hands out: an opaque,
//! already-encoded bitmap. Keeping the bytes encoded (instead of passing
//! `DynamicImage` around) means the remote layer only needs to base64-wrap
//! them, and in-memory test sources can hand out any bytes they like.
//!
//! PNG is used because it is lossless; blurred digits on a scanned bill are
//! exactly what makes amounts come back wrong.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::fmt;
use std::io::Cursor;
use tracing::debug;

/// One encoded page of a document.
#[derive(Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-indexed page number.
    pub page_num: usize,
    pub mime_type: &'static str,
    pub data: Vec<u8>,
}

impl PageImage {
    /// Wrap already-encoded PNG bytes.
    pub fn png(page_num: usize, data: Vec<u8>) -> Self {
        Self {
            page_num,
            mime_type: "image/png",
            data,
        }
    }

    /// Base64 attachment for a multimodal chat message.
    ///
    /// `detail: "high"` keeps the full tile budget on GPT-4-class models;
    /// small print on itemised bills is lost at low detail.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(STANDARD.encode(&self.data), self.mime_type).with_detail("high")
    }
}

impl fmt::Debug for PageImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageImage")
            .field("page_num", &self.page_num)
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// PNG-encode a rasterised page.
pub fn encode_page(page_num: usize, img: &DynamicImage) -> Result<PageImage, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded page {} ({}x{}) → {} bytes PNG",
        page_num,
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(PageImage::png(page_num, buf))
}
