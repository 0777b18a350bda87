//! Image XObject extraction.
//!
//! Walks a page's resources (inherited through the page tree and nested
//! Form XObjects) and returns each referenced image once, in its native
//! encoding where one exists.

use std::collections::HashSet;
use std::io::Read;

use flate2::read::ZlibDecoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use lopdf::{Dictionary, Document as LopdfDocument, Object, ObjectId, Stream};

use crate::error::{Error, Result};
use crate::model::{ExtractedImage, ImageEncoding};

/// Forms nested deeper than this are not searched.
const MAX_FORM_DEPTH: usize = 8;

/// Collect the images referenced by a page, in resource order.
pub(crate) fn collect_page_images(
    doc: &LopdfDocument,
    page_id: ObjectId,
) -> Result<Vec<ExtractedImage>> {
    let mut images = Vec::new();
    let mut seen = HashSet::new();

    if let Some(resources) = page_resources(doc, page_id)? {
        collect_from_resources(doc, resources, &mut seen, &mut images, 0)?;
    }
    log::debug!("Page object {:?}: {} images", page_id, images.len());
    Ok(images)
}

/// Find the page's Resources, following the Parent chain for inherited ones.
fn page_resources(doc: &LopdfDocument, page_id: ObjectId) -> Result<Option<&Dictionary>> {
    let mut node = doc
        .get_dictionary(page_id)
        .map_err(|e| Error::ImageExtract(e.to_string()))?;
    let mut visited = HashSet::new();

    loop {
        if let Ok(res) = node.get(b"Resources") {
            return Ok(resolve_dict(doc, res));
        }
        let parent = match node.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => parent,
            Err(_) => return Ok(None),
        };
        if !visited.insert(parent) {
            return Ok(None);
        }
        node = match doc.get_dictionary(parent) {
            Ok(dict) => dict,
            Err(_) => return Ok(None),
        };
    }
}

fn resolve_dict<'a>(doc: &'a LopdfDocument, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Reference(r) => doc.get_dictionary(*r).ok(),
        Object::Dictionary(d) => Some(d),
        _ => None,
    }
}

fn collect_from_resources(
    doc: &LopdfDocument,
    resources: &Dictionary,
    seen: &mut HashSet<ObjectId>,
    images: &mut Vec<ExtractedImage>,
    depth: usize,
) -> Result<()> {
    let xobjects = match resources.get(b"XObject").ok().and_then(|o| resolve_dict(doc, o)) {
        Some(dict) => dict,
        None => return Ok(()),
    };

    for (name, obj) in xobjects.iter() {
        // Inline (direct) XObject streams are not shared and rarely seen
        let Ok(obj_ref) = obj.as_reference() else {
            continue;
        };
        if !seen.insert(obj_ref) {
            continue;
        }

        let stream = match doc.get_object(obj_ref) {
            Ok(Object::Stream(stream)) => stream,
            Ok(_) => continue,
            Err(e) => {
                return Err(Error::ImageExtract(format!(
                    "XObject /{}: {}",
                    String::from_utf8_lossy(name),
                    e
                )))
            }
        };

        match stream.dict.get(b"Subtype").and_then(Object::as_name_str) {
            Ok("Image") => images.push(extract_image(doc, stream)?),
            Ok("Form") if depth < MAX_FORM_DEPTH => {
                if let Some(form_res) = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|o| resolve_dict(doc, o))
                {
                    collect_from_resources(doc, form_res, seen, images, depth + 1)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Names of the stream's filters, outermost first.
fn filter_names(dict: &Dictionary) -> Vec<String> {
    match dict.get(b"Filter") {
        Ok(Object::Name(n)) => vec![String::from_utf8_lossy(n).to_string()],
        Ok(Object::Array(arr)) => arr
            .iter()
            .filter_map(|o| o.as_name_str().ok())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

fn dict_u32(dict: &Dictionary, key: &[u8]) -> Option<u32> {
    dict.get(key)
        .ok()
        .and_then(|v| v.as_i64().ok())
        .and_then(|v| u32::try_from(v).ok())
}

/// Color space name and component count, when known.
fn color_space(doc: &LopdfDocument, dict: &Dictionary) -> (Option<String>, Option<u32>) {
    let cs = match dict.get(b"ColorSpace") {
        Ok(Object::Reference(r)) => doc.get_object(*r).ok(),
        Ok(obj) => Some(obj),
        Err(_) => None,
    };

    match cs {
        Some(Object::Name(n)) => {
            let name = String::from_utf8_lossy(n).to_string();
            let components = match name.as_str() {
                "DeviceGray" | "G" | "CalGray" => Some(1),
                "DeviceRGB" | "RGB" | "CalRGB" => Some(3),
                "DeviceCMYK" | "CMYK" => Some(4),
                _ => None,
            };
            (Some(name), components)
        }
        Some(Object::Array(arr)) => {
            let name = arr.first().and_then(|o| o.as_name_str().ok()).map(String::from);
            // ICC profiles carry their component count as /N
            let components = match name.as_deref() {
                Some("ICCBased") => arr
                    .get(1)
                    .and_then(|o| o.as_reference().ok())
                    .and_then(|r| doc.get_object(r).ok())
                    .and_then(|o| o.as_stream().ok())
                    .and_then(|s| dict_u32(&s.dict, b"N")),
                _ => None,
            };
            (name, components)
        }
        _ => (None, None),
    }
}

/// Pull one image out of its XObject stream.
fn extract_image(doc: &LopdfDocument, stream: &Stream) -> Result<ExtractedImage> {
    let dict = &stream.dict;
    let filters = filter_names(dict);
    let width = dict_u32(dict, b"Width");
    let height = dict_u32(dict, b"Height");
    // A depth that does not fit a byte is malformed; treat it as absent
    let bits = dict_u32(dict, b"BitsPerComponent").and_then(|b| u8::try_from(b).ok());
    let (cs_name, components) = color_space(doc, dict);

    let codec = filters
        .iter()
        .enumerate()
        .find_map(|(i, f)| ImageEncoding::from_filter(f).map(|enc| (i, enc)));

    let mut image = match codec {
        Some((idx, encoding)) => {
            let data = strip_flate_layers(&stream.content, &filters[..idx])?;
            ExtractedImage::new(data, encoding)
        }
        None => {
            let samples = if filters.is_empty() {
                stream.content.clone()
            } else {
                stream
                    .decompressed_content()
                    .map_err(|e| Error::ImageExtract(e.to_string()))?
            };
            encode_samples(samples, width, height, bits, components)?
        }
    };

    if let (Some(w), Some(h)) = (width, height) {
        image = image.with_dimensions(w, h);
    }
    if let Some(cs) = cs_name {
        image = image.with_color_space(cs);
    }
    if let Some(b) = bits {
        image = image.with_bits_per_component(b);
    }
    Ok(image)
}

/// Undo general-purpose compression wrapped around an image codec.
fn strip_flate_layers(content: &[u8], layers: &[String]) -> Result<Vec<u8>> {
    let mut data = content.to_vec();
    for layer in layers {
        if layer != "FlateDecode" && layer != "Fl" {
            return Err(Error::ImageExtract(format!(
                "unsupported filter {} before image codec",
                layer
            )));
        }
        let mut decoded = Vec::new();
        ZlibDecoder::new(data.as_slice())
            .read_to_end(&mut decoded)
            .map_err(|e| Error::ImageExtract(format!("FlateDecode: {}", e)))?;
        data = decoded;
    }
    Ok(data)
}

/// Wrap 8-bit gray or RGB samples into PNG; keep anything else as raw samples.
fn encode_samples(
    samples: Vec<u8>,
    width: Option<u32>,
    height: Option<u32>,
    bits: Option<u8>,
    components: Option<u32>,
) -> Result<ExtractedImage> {
    let color_type = match components {
        Some(1) => Some(ExtendedColorType::L8),
        Some(3) => Some(ExtendedColorType::Rgb8),
        _ => None,
    };

    if let (Some(w), Some(h), Some(8), Some(ct), Some(n)) = (width, height, bits, color_type, components) {
        let expected = w as usize * h as usize * n as usize;
        if expected > 0 && samples.len() >= expected {
            let mut png = Vec::new();
            PngEncoder::new(&mut png)
                .write_image(&samples[..expected], w, h, ct)
                .map_err(|e| Error::ImageExtract(format!("PNG encoding: {}", e)))?;
            return Ok(ExtractedImage::new(png, ImageEncoding::Png));
        }
    }

    Ok(ExtractedImage::new(samples, ImageEncoding::Raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use lopdf::dictionary;
    use std::io::Write;

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_gray_samples_become_png() {
        let image = encode_samples(vec![0, 255, 255, 0], Some(2), Some(2), Some(8), Some(1)).unwrap();
        assert_eq!(image.encoding, ImageEncoding::Png);
        assert_eq!(ImageEncoding::sniff(&image.data), Some(ImageEncoding::Png));
    }

    #[test]
    fn test_unsupported_layout_stays_raw() {
        let image = encode_samples(vec![1, 2, 3, 4], Some(2), Some(2), Some(8), Some(4)).unwrap();
        assert_eq!(image.encoding, ImageEncoding::Raw);

        // Truncated sample data
        let image = encode_samples(vec![1, 2], Some(2), Some(2), Some(8), Some(1)).unwrap();
        assert_eq!(image.encoding, ImageEncoding::Raw);
    }

    #[test]
    fn test_flate_wrapped_jpeg_is_unwrapped() {
        let jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3];
        let doc = LopdfDocument::with_version("1.5");
        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "BitsPerComponent" => 8,
                "ColorSpace" => "DeviceRGB",
                "Filter" => vec![Object::Name(b"FlateDecode".to_vec()), Object::Name(b"DCTDecode".to_vec())],
            },
            zlib(&jpeg),
        );

        let image = extract_image(&doc, &stream).unwrap();
        assert_eq!(image.encoding, ImageEncoding::Jpeg);
        assert_eq!(image.data, jpeg);
        assert_eq!(image.color_space.as_deref(), Some("DeviceRGB"));
    }

    #[test]
    fn test_oversized_bit_depth_is_not_truncated() {
        // 264 would wrap to 8 if narrowed with `as u8`
        let doc = LopdfDocument::with_version("1.5");
        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 2,
                "BitsPerComponent" => 264,
                "ColorSpace" => "DeviceGray",
            },
            vec![0, 255, 255, 0],
        );

        let image = extract_image(&doc, &stream).unwrap();
        assert_eq!(image.encoding, ImageEncoding::Raw);
        assert_eq!(image.bits_per_component, None);
        assert_eq!(image.width, Some(2));
    }

    #[test]
    fn test_eight_bit_gray_stream_becomes_png() {
        let doc = LopdfDocument::with_version("1.5");
        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 2,
                "BitsPerComponent" => 8,
                "ColorSpace" => "DeviceGray",
            },
            vec![0, 255, 255, 0],
        );

        let image = extract_image(&doc, &stream).unwrap();
        assert_eq!(image.encoding, ImageEncoding::Png);
        assert_eq!(image.bits_per_component, Some(8));
    }

    #[test]
    fn test_unknown_prefix_filter_is_an_error() {
        let layers = vec!["ASCII85Decode".to_string()];
        assert!(strip_flate_layers(b"abc", &layers).is_err());
    }
}
