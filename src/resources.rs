//! Fonts and images registered on a document, and page resource
//! dictionaries that use them.
//!
//! Only the base-14 Type1 fonts are offered; they need no embedded program.
//! Images are image XObjects whose data is already encoded (JPEG passes
//! through with DCTDecode) or raw samples, which are Flate-compressed.

use crate::error::{Error, Result};
use crate::filters::flate_encode;
use crate::object::{Dictionary, Object, ObjectRef};

/// The 14 standard Type1 fonts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardFont {
    /// Helvetica
    Helvetica,
    /// Helvetica-Bold
    HelveticaBold,
    /// Helvetica-Oblique
    HelveticaOblique,
    /// Helvetica-BoldOblique
    HelveticaBoldOblique,
    /// Times-Roman
    TimesRoman,
    /// Times-Bold
    TimesBold,
    /// Times-Italic
    TimesItalic,
    /// Times-BoldItalic
    TimesBoldItalic,
    /// Courier
    Courier,
    /// Courier-Bold
    CourierBold,
    /// Courier-Oblique
    CourierOblique,
    /// Courier-BoldOblique
    CourierBoldOblique,
    /// Symbol
    Symbol,
    /// ZapfDingbats
    ZapfDingbats,
}

impl StandardFont {
    /// The `/BaseFont` name.
    pub fn base_font(&self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
            StandardFont::HelveticaOblique => "Helvetica-Oblique",
            StandardFont::HelveticaBoldOblique => "Helvetica-BoldOblique",
            StandardFont::TimesRoman => "Times-Roman",
            StandardFont::TimesBold => "Times-Bold",
            StandardFont::TimesItalic => "Times-Italic",
            StandardFont::TimesBoldItalic => "Times-BoldItalic",
            StandardFont::Courier => "Courier",
            StandardFont::CourierBold => "Courier-Bold",
            StandardFont::CourierOblique => "Courier-Oblique",
            StandardFont::CourierBoldOblique => "Courier-BoldOblique",
            StandardFont::Symbol => "Symbol",
            StandardFont::ZapfDingbats => "ZapfDingbats",
        }
    }

    /// Font dictionary; symbolic fonts keep their built-in encoding.
    pub(crate) fn font_dict(&self) -> Object {
        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Object::name("Font"));
        dict.insert("Subtype".to_string(), Object::name("Type1"));
        dict.insert("BaseFont".to_string(), Object::name(self.base_font()));
        if !matches!(self, StandardFont::Symbol | StandardFont::ZapfDingbats) {
            dict.insert("Encoding".to_string(), Object::name("WinAnsiEncoding"));
        }
        Object::Dictionary(dict)
    }
}

/// Color space of image samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    /// Grayscale (1 component per pixel)
    DeviceGray,
    /// RGB color (3 components per pixel)
    DeviceRGB,
    /// CMYK color (4 components per pixel)
    DeviceCMYK,
}

impl ColorSpace {
    /// Get the number of color components.
    pub fn components(&self) -> u8 {
        match self {
            ColorSpace::DeviceGray => 1,
            ColorSpace::DeviceRGB => 3,
            ColorSpace::DeviceCMYK => 4,
        }
    }

    /// Get the PDF name for this color space.
    pub fn pdf_name(&self) -> &'static str {
        match self {
            ColorSpace::DeviceGray => "DeviceGray",
            ColorSpace::DeviceRGB => "DeviceRGB",
            ColorSpace::DeviceCMYK => "DeviceCMYK",
        }
    }
}

/// An image XObject ready to be registered on a document.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageXObject {
    /// Width in samples
    pub width: u32,
    /// Height in samples
    pub height: u32,
    /// Color space of the samples
    pub color_space: ColorSpace,
    /// Bits per component
    pub bits_per_component: u8,
    /// Filter the data is encoded with, if any
    pub filter: Option<String>,
    /// Encoded sample data
    pub data: Vec<u8>,
}

impl ImageXObject {
    /// Wrap JPEG data, reading size and components from its frame header.
    pub fn from_jpeg(data: Vec<u8>) -> Result<Self> {
        let (width, height, color_space) = parse_jpeg_header(&data)?;
        Ok(Self {
            width,
            height,
            color_space,
            bits_per_component: 8,
            filter: Some("DCTDecode".to_string()),
            data,
        })
    }

    /// Compress raw 8-bit samples.
    pub fn from_raw(width: u32, height: u32, color_space: ColorSpace, samples: &[u8]) -> Result<Self> {
        let expected = width as usize * height as usize * color_space.components() as usize;
        if samples.len() != expected {
            return Err(Error::usage(format!(
                "image of {}x{} {} needs {} sample bytes, got {}",
                width,
                height,
                color_space.pdf_name(),
                expected,
                samples.len()
            )));
        }
        Ok(Self {
            width,
            height,
            color_space,
            bits_per_component: 8,
            filter: Some("FlateDecode".to_string()),
            data: flate_encode(samples)?,
        })
    }

    pub(crate) fn to_stream(&self) -> Object {
        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Object::name("XObject"));
        dict.insert("Subtype".to_string(), Object::name("Image"));
        dict.insert("Width".to_string(), Object::Integer(self.width as i64));
        dict.insert("Height".to_string(), Object::Integer(self.height as i64));
        dict.insert("ColorSpace".to_string(), Object::name(self.color_space.pdf_name()));
        dict.insert(
            "BitsPerComponent".to_string(),
            Object::Integer(self.bits_per_component as i64),
        );
        if let Some(filter) = &self.filter {
            dict.insert("Filter".to_string(), Object::name(filter.clone()));
        }
        Object::stream(dict, self.data.clone())
    }
}

fn parse_jpeg_header(data: &[u8]) -> Result<(u32, u32, ColorSpace)> {
    if data.len() < 2 || data[0] != 0xFF || data[1] != 0xD8 {
        return Err(Error::usage("not a JPEG image"));
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let marker = data[pos + 1];
        pos += 2;
        if marker == 0xFF || marker == 0x00 {
            continue;
        }

        // Start-of-frame markers
        if matches!(marker, 0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF) {
            if pos + 7 >= data.len() {
                return Err(Error::usage("truncated JPEG frame header"));
            }
            let height = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as u32;
            let width = u16::from_be_bytes([data[pos + 5], data[pos + 6]]) as u32;
            let color_space = match data[pos + 7] {
                1 => ColorSpace::DeviceGray,
                4 => ColorSpace::DeviceCMYK,
                _ => ColorSpace::DeviceRGB,
            };
            return Ok((width, height, color_space));
        }

        if pos + 2 > data.len() {
            break;
        }
        pos += u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
    }
    Err(Error::usage("JPEG has no frame header"))
}

/// A registered font, addressed by its resource name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontHandle {
    /// Resource name, e.g. `F1`
    pub name: String,
    pub(crate) local: ObjectRef,
}

/// A registered image, addressed by its resource name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    /// Resource name, e.g. `Im1`
    pub name: String,
    pub(crate) local: ObjectRef,
    /// Width in samples
    pub width: u32,
    /// Height in samples
    pub height: u32,
}

/// Fonts and images a new page uses.
#[derive(Debug, Clone, Default)]
pub struct PageResources {
    fonts: Vec<FontHandle>,
    images: Vec<ImageHandle>,
}

impl PageResources {
    /// Empty resources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a font.
    pub fn font(mut self, font: &FontHandle) -> Self {
        self.fonts.push(font.clone());
        self
    }

    /// Use an image.
    pub fn image(mut self, image: &ImageHandle) -> Self {
        self.images.push(image.clone());
        self
    }

    /// Resource dictionary in the document's own numbering.
    pub(crate) fn to_dict(&self, procset: ObjectRef) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.insert("ProcSet".to_string(), Object::Reference(procset));
        if !self.fonts.is_empty() {
            let fonts = self
                .fonts
                .iter()
                .map(|f| (f.name.clone(), Object::Reference(f.local)))
                .collect();
            dict.insert("Font".to_string(), Object::Dictionary(fonts));
        }
        if !self.images.is_empty() {
            let images = self
                .images
                .iter()
                .map(|i| (i.name.clone(), Object::Reference(i.local)))
                .collect();
            dict.insert("XObject".to_string(), Object::Dictionary(images));
        }
        dict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_font_dict() {
        let dict = StandardFont::TimesBold.font_dict();
        assert_eq!(dict.get("BaseFont"), Some(&Object::name("Times-Bold")));
        assert_eq!(dict.get("Encoding"), Some(&Object::name("WinAnsiEncoding")));
        assert!(StandardFont::ZapfDingbats.font_dict().get("Encoding").is_none());
    }

    #[test]
    fn test_jpeg_header() {
        // SOI, APP0 (length 4), SOF0 with 2x3 RGB
        let jpeg = vec![
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00, 0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00, 0x03,
            0x00, 0x02, 0x03, 0x00,
        ];
        let image = ImageXObject::from_jpeg(jpeg).unwrap();
        assert_eq!((image.width, image.height), (2, 3));
        assert_eq!(image.color_space, ColorSpace::DeviceRGB);
        assert_eq!(image.to_stream().get("Filter"), Some(&Object::name("DCTDecode")));
    }

    #[test]
    fn test_raw_image_size_checked() {
        assert!(ImageXObject::from_raw(2, 2, ColorSpace::DeviceGray, &[0; 3]).unwrap_err().is_usage());
        let image = ImageXObject::from_raw(2, 2, ColorSpace::DeviceGray, &[0, 64, 128, 255]).unwrap();
        assert_eq!(image.filter.as_deref(), Some("FlateDecode"));
    }

    #[test]
    fn test_page_resources_dict() {
        let font = FontHandle {
            name: "F1".to_string(),
            local: ObjectRef::new(3, 0),
        };
        let dict = PageResources::new().font(&font).to_dict(ObjectRef::new(1, 0));
        assert_eq!(dict.get("ProcSet"), Some(&Object::Reference(ObjectRef::new(1, 0))));
        assert_eq!(
            dict.get("Font").and_then(|f| f.get("F1")),
            Some(&Object::Reference(ObjectRef::new(3, 0)))
        );
        assert!(!dict.contains_key("XObject"));
    }
}
