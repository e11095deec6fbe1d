use std::fmt::Write as _;

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, Blend, Canvas};
use imageproc::rect::Rect;
use serde::Serialize;
use thiserror::Error;

use crate::acquisition::{DataUri, DataUriError};
use crate::analysis::{AnalysisResult, BoundingBox};

const REGION_BASE_HUE: f64 = 35.0;
const BOX_COLOR: Rgba<u8> = Rgba([56, 189, 248, 255]);
const LABEL_BACKGROUND: Rgba<u8> = Rgba([15, 23, 42, 200]);
const LABEL_TEXT: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BannerKind {
    Detected,
    NotDetected,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Banner {
    pub kind: BannerKind,
    pub title: &'static str,
    pub species: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Metric {
    CamouflageLevel,
    Confidence,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gauge {
    pub metric: Metric,
    pub title: &'static str,
    pub value: f64,
    pub value_label: String,
    pub tier: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxOverlay {
    pub rect: BoundingBox,
    pub label: &'static str,
}

/// Heat-map rectangle. Every opacity grows with intensity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionOverlay {
    pub rect: BoundingBox,
    pub intensity: f64,
    pub hue_start: f64,
    pub hue_end: f64,
    pub fill_opacity_start: f64,
    pub fill_opacity_end: f64,
    pub border_opacity: f64,
    pub glow_opacity: f64,
    pub label: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub hue: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultView {
    pub banner: Banner,
    pub gauges: [Gauge; 2],
    pub preview: String,
    pub overall_badge: String,
    pub bounding_box: Option<BoxOverlay>,
    pub regions: Vec<RegionOverlay>,
    pub legend: Option<Vec<LegendEntry>>,
    pub adaptations: Option<Vec<String>>,
}

pub fn camouflage_tier(percentage: f64) -> &'static str {
    if percentage >= 70.0 {
        "Excellent"
    } else if percentage >= 40.0 {
        "Moderate"
    } else {
        "Low"
    }
}

pub fn confidence_tier(confidence: f64) -> &'static str {
    if confidence >= 80.0 {
        "Very High"
    } else if confidence >= 60.0 {
        "High"
    } else {
        "Moderate"
    }
}

pub fn percent_label(value: f64) -> String {
    format!("{}%", value)
}

pub fn render(result: &AnalysisResult, preview: &str) -> ResultView {
    let banner = Banner {
        kind: if result.detected {
            BannerKind::Detected
        } else {
            BannerKind::NotDetected
        },
        title: if result.detected {
            "Camouflage Detected!"
        } else {
            "No Camouflage Detected"
        },
        species: result.species.clone(),
        description: result.description.clone(),
    };

    let gauges = [
        Gauge {
            metric: Metric::CamouflageLevel,
            title: "Camouflage Level",
            value: result.camouflage_percentage,
            value_label: percent_label(result.camouflage_percentage),
            tier: camouflage_tier(result.camouflage_percentage),
        },
        Gauge {
            metric: Metric::Confidence,
            title: "AI Confidence",
            value: result.confidence,
            value_label: percent_label(result.confidence),
            tier: confidence_tier(result.confidence),
        },
    ];

    let regions: Vec<RegionOverlay> = result
        .camouflage_regions
        .iter()
        .map(|region| {
            let intensity = region.intensity;
            RegionOverlay {
                rect: region.rect(),
                intensity,
                hue_start: REGION_BASE_HUE + intensity * 0.5,
                hue_end: intensity * 0.3,
                fill_opacity_start: intensity / 200.0,
                fill_opacity_end: intensity / 150.0,
                border_opacity: intensity / 100.0,
                glow_opacity: intensity / 200.0,
                label: percent_label(intensity),
                title: format!(
                    "{}: {}% camouflage intensity",
                    region.description, intensity
                ),
            }
        })
        .collect();

    let legend: Option<Vec<LegendEntry>> = (!result.camouflage_regions.is_empty()).then(|| {
        result
            .camouflage_regions
            .iter()
            .map(|region| LegendEntry {
                hue: REGION_BASE_HUE + region.intensity * 0.5,
                text: format!("{} - {}% intensity", region.description, region.intensity),
            })
            .collect()
    });

    ResultView {
        banner,
        gauges,
        preview: preview.to_string(),
        overall_badge: format!("{}% Overall", result.camouflage_percentage),
        bounding_box: result.bounding_box.map(|rect| BoxOverlay {
            rect,
            label: "Species Detected",
        }),
        regions,
        legend,
        adaptations: (!result.adaptations.is_empty()).then(|| result.adaptations.clone()),
    }
}

/// Plain-text rendering of a view, for terminals.
pub fn render_text(view: &ResultView) -> String {
    let mut out = String::new();
    let marker = match view.banner.kind {
        BannerKind::Detected => "[+]",
        BannerKind::NotDetected => "[!]",
    };
    let _ = writeln!(out, "{} {}", marker, view.banner.title);
    if let Some(species) = &view.banner.species {
        let _ = writeln!(out, "    Species: {}", species);
    }
    if !view.banner.description.is_empty() {
        let _ = writeln!(out, "    {}", view.banner.description);
    }
    let _ = writeln!(out);

    for gauge in &view.gauges {
        let filled = (gauge.value / 5.0).round() as usize;
        let _ = writeln!(
            out,
            "{:<17} {:>5} [{:<20}] {}",
            gauge.title,
            gauge.value_label,
            "#".repeat(filled.min(20)),
            gauge.tier
        );
    }
    let _ = writeln!(out, "{}", view.overall_badge);

    if let Some(overlay) = &view.bounding_box {
        let _ = writeln!(
            out,
            "\n{} at x={}% y={}% w={}% h={}%",
            overlay.label, overlay.rect.x, overlay.rect.y, overlay.rect.width, overlay.rect.height
        );
    }
    if let Some(legend) = &view.legend {
        let _ = writeln!(out, "\nDetected Regions:");
        for entry in legend {
            let _ = writeln!(out, "  * {}", entry.text);
        }
    }
    if let Some(adaptations) = &view.adaptations {
        let _ = writeln!(out, "\nCamouflage Adaptations:");
        for adaptation in adaptations {
            let _ = writeln!(out, "  - {}", adaptation);
        }
    }
    out
}

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error(transparent)]
    DataUri(#[from] DataUriError),
    #[error("failed to decode preview: {0}")]
    Decode(#[from] image::ImageError),
}

/// Decodes the data URI preview carried by `view`.
pub fn preview_image(view: &ResultView) -> Result<DynamicImage, PreviewError> {
    let preview = DataUri::parse(&view.preview)?;
    Ok(image::load_from_memory(&preview.bytes)?)
}

/// Draws the detection map (regions, bounding box, labels) over `image`.
pub fn annotate(image: &DynamicImage, view: &ResultView) -> RgbaImage {
    let mut canvas = Blend(image.to_rgba8());
    let (width, height) = canvas.0.dimensions();
    let thickness = (width.min(height) / 150).max(1);
    let scale = (width.min(height) / 300).max(1);

    for region in &view.regions {
        let Some(rect) = to_pixels(&region.rect, width, height) else {
            continue;
        };
        draw_glow(&mut canvas, rect, region.glow_opacity, thickness * 3);
        let fill = hsla(
            (region.hue_start + region.hue_end) / 2.0,
            0.9,
            0.6,
            (region.fill_opacity_start + region.fill_opacity_end) / 2.0,
        );
        draw_filled_rect_mut(&mut canvas, rect, fill);
        let border = hsla(REGION_BASE_HUE, 0.9, 0.6, region.border_opacity);
        draw_outline(&mut canvas, rect, border, thickness);
        draw_label(
            &mut canvas,
            rect.left() + rect.width() as i32 / 2,
            rect.bottom() + 1 + thickness as i32,
            &region.label,
            scale,
        );
    }

    if let Some(overlay) = &view.bounding_box {
        if let Some(rect) = to_pixels(&overlay.rect, width, height) {
            // opaque, so drawn straight onto the buffer
            draw_outline(&mut canvas.0, rect, BOX_COLOR, thickness * 2);
            let label_height = 8 * scale as i32 + 4;
            let text_x = rect.left() + text_width(overlay.label, scale) / 2;
            draw_label(
                &mut canvas,
                text_x,
                rect.top() - label_height,
                overlay.label,
                scale,
            );
        }
    }

    canvas.0
}

fn to_pixels(rect: &BoundingBox, width: u32, height: u32) -> Option<Rect> {
    let px = |pct: f64, total: u32| ((pct / 100.0) * f64::from(total)).round() as u32;
    let (w, h) = (px(rect.width, width), px(rect.height, height));
    if w == 0 || h == 0 {
        return None;
    }
    Some(Rect::at(px(rect.x, width) as i32, px(rect.y, height) as i32).of_size(w, h))
}

fn hsla(hue: f64, saturation: f64, lightness: f64, alpha: f64) -> Rgba<u8> {
    let hue = hue.rem_euclid(360.0) / 60.0;
    let chroma = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let x = chroma * (1.0 - (hue % 2.0 - 1.0).abs());
    let (r, g, b) = match hue as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = lightness - chroma / 2.0;
    let channel = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba([
        channel(r),
        channel(g),
        channel(b),
        (alpha.clamp(0.0, 1.0) * 255.0).round() as u8,
    ])
}

fn draw_outline<C>(canvas: &mut C, rect: Rect, color: Rgba<u8>, thickness: u32)
where
    C: Canvas<Pixel = Rgba<u8>>,
{
    for t in 0..thickness.max(1) {
        let w = rect.width().saturating_sub(2 * t);
        let h = rect.height().saturating_sub(2 * t);
        if w == 0 || h == 0 {
            break;
        }
        let inner = Rect::at(rect.left() + t as i32, rect.top() + t as i32).of_size(w, h);
        draw_hollow_rect_mut(canvas, inner, color);
    }
}

/// Soft halo outside `rect`, fading out over `spread` pixels.
fn draw_glow(canvas: &mut Blend<RgbaImage>, rect: Rect, opacity: f64, spread: u32) {
    for k in 1..=spread {
        let fade = 1.0 - f64::from(k) / f64::from(spread + 1);
        let ring = Rect::at(rect.left() - k as i32, rect.top() - k as i32)
            .of_size(rect.width() + 2 * k, rect.height() + 2 * k);
        draw_hollow_rect_mut(canvas, ring, hsla(REGION_BASE_HUE, 0.9, 0.6, opacity * fade));
    }
}

fn text_width(text: &str, scale: u32) -> i32 {
    text.chars().count() as i32 * 8 * scale as i32
}

/// Draws `text` on a dark pill centred horizontally on `center_x`.
fn draw_label(canvas: &mut Blend<RgbaImage>, center_x: i32, top: i32, text: &str, scale: u32) {
    let scale = scale.max(1);
    let cell = 8 * scale as i32;
    let width = text_width(text, scale);
    let left = center_x - width / 2;
    let top = top.max(0);

    let background = Rect::at(left - 2, top - 2).of_size(width as u32 + 4, cell as u32 + 4);
    draw_filled_rect_mut(canvas, background, LABEL_BACKGROUND);

    for (idx, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            continue;
        };
        let origin_x = left + idx as i32 * cell;
        for (row_idx, &bits) in glyph.iter().enumerate() {
            for col in 0..8 {
                if (bits >> col) & 1 == 0 {
                    continue;
                }
                let dot = Rect::at(
                    origin_x + col * scale as i32,
                    top + row_idx as i32 * scale as i32,
                )
                .of_size(scale, scale);
                draw_filled_rect_mut(canvas, dot, LABEL_TEXT);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    use crate::analysis::CamouflageRegion;

    fn result() -> AnalysisResult {
        AnalysisResult {
            detected: true,
            species: Some("Leaf insect".into()),
            camouflage_percentage: 82.0,
            confidence: 91.0,
            description: "Hidden among leaves".into(),
            adaptations: vec!["color matching".into()],
            bounding_box: Some(BoundingBox {
                x: 10.0,
                y: 10.0,
                width: 30.0,
                height: 40.0,
            }),
            camouflage_regions: vec![CamouflageRegion {
                description: "wings".into(),
                intensity: 75.0,
                x: 12.0,
                y: 12.0,
                width: 20.0,
                height: 15.0,
            }],
        }
    }

    #[test]
    fn camouflage_tiers_are_inclusive_at_lower_bound() {
        assert_eq!(camouflage_tier(100.0), "Excellent");
        assert_eq!(camouflage_tier(70.0), "Excellent");
        assert_eq!(camouflage_tier(69.0), "Moderate");
        assert_eq!(camouflage_tier(40.0), "Moderate");
        assert_eq!(camouflage_tier(39.0), "Low");
        assert_eq!(camouflage_tier(0.0), "Low");
    }

    #[test]
    fn confidence_tiers_are_inclusive_at_lower_bound() {
        assert_eq!(confidence_tier(80.0), "Very High");
        assert_eq!(confidence_tier(79.0), "High");
        assert_eq!(confidence_tier(60.0), "High");
        assert_eq!(confidence_tier(59.0), "Moderate");
        assert_eq!(confidence_tier(0.0), "Moderate");
    }

    #[test]
    fn renders_positive_detection() {
        let view = render(&result(), "data:image/png;base64,AA==");
        assert_eq!(view.banner.kind, BannerKind::Detected);
        assert_eq!(view.banner.title, "Camouflage Detected!");
        assert_eq!(view.banner.species.as_deref(), Some("Leaf insect"));
        assert_eq!(view.gauges[0].tier, "Excellent");
        assert_eq!(view.gauges[0].value_label, "82%");
        assert_eq!(view.gauges[1].tier, "Very High");
        assert_eq!(view.overall_badge, "82% Overall");
        assert_eq!(view.bounding_box.as_ref().unwrap().label, "Species Detected");
        assert_eq!(view.regions.len(), 1);
        assert_eq!(view.regions[0].label, "75%");
        assert_eq!(view.regions[0].title, "wings: 75% camouflage intensity");
        assert_eq!(
            view.legend.as_ref().unwrap()[0].text,
            "wings - 75% intensity"
        );
        assert_eq!(view.adaptations.as_deref(), Some(&["color matching".to_string()][..]));
    }

    #[test]
    fn empty_sections_are_omitted() {
        let mut result = result();
        result.detected = false;
        result.species = None;
        result.bounding_box = None;
        result.adaptations.clear();
        result.camouflage_regions.clear();

        let view = render(&result, "");
        assert_eq!(view.banner.kind, BannerKind::NotDetected);
        assert_eq!(view.banner.title, "No Camouflage Detected");
        assert!(view.bounding_box.is_none());
        assert!(view.regions.is_empty());
        assert!(view.legend.is_none());
        assert!(view.adaptations.is_none());

        let text = render_text(&view);
        assert!(!text.contains("Detected Regions"));
        assert!(!text.contains("Camouflage Adaptations"));
    }

    #[test]
    fn region_emphasis_grows_with_intensity() {
        let mut result = result();
        result.camouflage_regions = [20.0, 50.0, 90.0]
            .into_iter()
            .map(|intensity| CamouflageRegion {
                description: "patch".into(),
                intensity,
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
            })
            .collect();
        let view = render(&result, "");
        for pair in view.regions.windows(2) {
            assert!(pair[0].fill_opacity_start < pair[1].fill_opacity_start);
            assert!(pair[0].fill_opacity_end < pair[1].fill_opacity_end);
            assert!(pair[0].border_opacity < pair[1].border_opacity);
            assert!(pair[0].glow_opacity < pair[1].glow_opacity);
        }
    }

    #[test]
    fn annotate_draws_box_and_region() {
        let view = render(&result(), "");
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255])));
        let out = annotate(&image, &view);
        assert_eq!(out.dimensions(), (100, 100));
        // left edge of the bounding box
        assert_eq!(*out.get_pixel(10, 30), BOX_COLOR);
        // region interior is tinted
        assert_ne!(*out.get_pixel(20, 18), Rgba([0, 0, 0, 255]));
        // outside every overlay stays untouched
        assert_eq!(*out.get_pixel(90, 90), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn region_glow_extends_past_border() {
        let mut result = result();
        result.bounding_box = None;
        result.camouflage_regions = vec![CamouflageRegion {
            description: "shell".into(),
            intensity: 80.0,
            x: 40.0,
            y: 40.0,
            width: 20.0,
            height: 20.0,
        }];
        let view = render(&result, "");
        let black = Rgba([0, 0, 0, 255]);
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(100, 100, black));
        let out = annotate(&image, &view);

        // two pixels outside the region's left border
        assert_ne!(*out.get_pixel(38, 50), black);
        assert_eq!(*out.get_pixel(30, 50), black);

        let mut faint = view.clone();
        faint.regions[0].glow_opacity = 0.0;
        let out = annotate(&image, &faint);
        assert_eq!(*out.get_pixel(38, 50), black);
    }

    #[test]
    fn preview_image_decodes_data_uri() {
        let mut png = Vec::new();
        DynamicImage::new_rgb8(6, 4)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageOutputFormat::Png)
            .unwrap();
        let view = render(&result(), &DataUri::encode("image/png", &png));
        let preview = preview_image(&view).unwrap();
        assert_eq!((preview.width(), preview.height()), (6, 4));

        let broken = render(&result(), "https://example.com/leaf.png");
        assert!(matches!(
            preview_image(&broken),
            Err(PreviewError::DataUri(DataUriError::MissingScheme))
        ));
    }

    #[test]
    fn hsla_matches_reference_colors() {
        assert_eq!(hsla(0.0, 1.0, 0.5, 1.0), Rgba([255, 0, 0, 255]));
        assert_eq!(hsla(120.0, 1.0, 0.5, 1.0), Rgba([0, 255, 0, 255]));
        assert_eq!(hsla(240.0, 1.0, 0.5, 0.5), Rgba([0, 0, 255, 128]));
    }

    #[test]
    fn text_rendering_lists_sections() {
        let text = render_text(&render(&result(), ""));
        assert!(text.contains("Camouflage Detected!"));
        assert!(text.contains("Species: Leaf insect"));
        assert!(text.contains("Excellent"));
        assert!(text.contains("Very High"));
        assert!(text.contains("wings - 75% intensity"));
        assert!(text.contains("  - color matching"));
    }
}
