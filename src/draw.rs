use embedded_graphics::{
    mono_font::{MonoFont, MonoTextStyle, MonoTextStyleBuilder},
    pixelcolor::Rgb888,
    prelude::*,
    primitives::Rectangle,
    text::{Baseline, Text},
};

use embedded_text::{
    alignment::{HorizontalAlignment, VerticalAlignment}, style::TextBoxStyleBuilder, TextBox
};

pub use embedded_graphics::mono_font::ascii::{FONT_4X6, FONT_5X8, FONT_6X10, FONT_7X13};

pub const WHITE: Rgb888 = Rgb888::WHITE;
pub const SKY_BLUE: Rgb888 = Rgb888::new(0, 191, 255);
pub const ERROR_RED: Rgb888 = Rgb888::new(255, 0, 0);

/// Width in pixels of `text` set in a monospaced font
pub fn text_width(text: &str, font: &MonoFont) -> u32 {
    let cw = font.character_size.width + font.character_spacing;
    (text.chars().count() as u32 * cw).saturating_sub(font.character_spacing)
}

pub fn draw_text<D>(
    target: &mut D,
    text: &str,
    x: i32,
    y: i32,
    font: &MonoFont,
    color: Rgb888,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb888> + OriginDimensions,
{
    Text::with_baseline(
        text,
        Point::new(x, y),
        MonoTextStyleBuilder::new()
            .font(font)
            .text_color(color)
            .build(),
        Baseline::Top,
    )
    .draw(target)?;
    Ok(())
}

/// One line of text centred horizontally across the whole target, top edge at `y`
pub fn draw_text_centered<D>(
    target: &mut D,
    text: &str,
    y: i32,
    font: &MonoFont,
    color: Rgb888,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb888> + OriginDimensions,
{
    let width = target.size().width;
    let size = Size::new(width, font.character_size.height);
    let character_style = MonoTextStyle::new(font, color);
    let textbox_style = TextBoxStyleBuilder::new()
        .alignment(HorizontalAlignment::Center)
        .vertical_alignment(VerticalAlignment::Middle)
        .build();
    let label_box = TextBox::with_textbox_style(
        text,
        Rectangle::new(Point::new(0, y), size),
        character_style,
        textbox_style,
    );
    label_box.draw(target)?;
    Ok(())
}

/// Centred text with a one pixel black halo, readable over images
pub fn draw_text_outlined<D>(
    target: &mut D,
    text: &str,
    y: i32,
    font: &MonoFont,
    color: Rgb888,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb888> + OriginDimensions,
{
    let x = (target.size().width as i32 - text_width(text, font) as i32) / 2;
    for dx in -1..=1 {
        for dy in -1..=1 {
            if dx != 0 || dy != 0 {
                draw_text(target, text, x + dx, y + dy, font, Rgb888::BLACK)?;
            }
        }
    }
    draw_text(target, text, x, y, font, color)
}

/// Lines `text` takes when word-wrapped at `cols` characters, None when a
/// single word is longer than a line
fn wrapped_lines(text: &str, cols: usize) -> Option<usize> {
    let mut lines = 0;
    let mut used = 0;
    for word in text.split_whitespace() {
        let len = word.chars().count();
        if len > cols {
            return None;
        }
        if used == 0 {
            lines += 1;
            used = len;
        } else if used + 1 + len <= cols {
            used += 1 + len;
        } else {
            lines += 1;
            used = len;
        }
    }
    Some(lines.max(1))
}

/// Wrapped message centred in the whole target; degraded plugin states use it.
///
/// When the wrapped text does not fit (small panels) a single line in the
/// smallest font is drawn instead, clipped at the right edge.
pub fn draw_message<D>(target: &mut D, text: &str, color: Rgb888) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb888> + OriginDimensions,
{
    let size = target.size();
    let cols = (size.width / FONT_5X8.character_size.width) as usize;
    let fits = wrapped_lines(text, cols)
        .is_some_and(|lines| lines as u32 * FONT_5X8.character_size.height <= size.height);
    if !fits {
        let x = (size.width as i32 - text_width(text, &FONT_4X6) as i32).max(0) / 2;
        let y = (size.height as i32 - FONT_4X6.character_size.height as i32).max(0) / 2;
        return draw_text(target, text, x, y, &FONT_4X6, color);
    }

    let character_style = MonoTextStyle::new(&FONT_5X8, color);
    let textbox_style = TextBoxStyleBuilder::new()
        .alignment(HorizontalAlignment::Center)
        .vertical_alignment(VerticalAlignment::Middle)
        .build();
    let area = Rectangle::new(Point::zero(), target.size());
    TextBox::with_textbox_style(text, area, character_style, textbox_style).draw(target)?;
    Ok(())
}

/// Colour from a JSON `[r, g, b]` list, `fallback` when malformed
pub fn color_from_value(value: Option<&serde_json::Value>, fallback: Rgb888) -> Rgb888 {
    let Some(items) = value.and_then(|v| v.as_array()) else { return fallback };
    let channels: Vec<u8> = items
        .iter()
        .filter_map(|c| c.as_u64())
        .map(|c| c.min(255) as u8)
        .collect();
    match channels.as_slice() {
        [r, g, b] => Rgb888::new(*r, *g, *b),
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::canvas::Canvas;
    use serde_json::json;

    #[test]
    fn test_text_width() {
        assert_eq!(text_width("12:34", &FONT_6X10), 30);
        assert_eq!(text_width("", &FONT_6X10), 0);
    }

    #[test]
    fn test_message_lights_pixels() {
        let mut canvas = Canvas::new(64, 32);
        draw_message(&mut canvas, "No GIF", ERROR_RED).unwrap();
        assert!(canvas.lit_pixels() > 0);
    }

    #[test]
    fn test_message_on_small_panel() {
        for msg in ["No GIF", "Weather offline"] {
            let mut canvas = Canvas::new(16, 8);
            draw_message(&mut canvas, msg, ERROR_RED).unwrap();
            assert!(canvas.lit_pixels() > 0, "{msg} drew nothing");
        }
    }

    #[test]
    fn test_wrapped_lines() {
        assert_eq!(wrapped_lines("No GIF", 12), Some(1));
        assert_eq!(wrapped_lines("Weather offline", 12), Some(2));
        assert_eq!(wrapped_lines("Weather", 3), None);
        assert_eq!(wrapped_lines("", 3), Some(1));
    }

    #[test]
    fn test_outlined_text_stays_on_canvas() {
        let mut canvas = Canvas::new(64, 32);
        draw_text_outlined(&mut canvas, "12:00", 10, &FONT_6X10, WHITE).unwrap();
        assert!(canvas.as_slice().iter().any(|&p| p == WHITE));
    }

    #[test]
    fn test_color_from_value() {
        let v = json!([10, 20, 300]);
        assert_eq!(color_from_value(Some(&v), WHITE), Rgb888::new(10, 20, 255));
        assert_eq!(color_from_value(Some(&json!("red")), WHITE), WHITE);
        assert_eq!(color_from_value(None, SKY_BLUE), SKY_BLUE);
    }
}
