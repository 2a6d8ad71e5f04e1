use crate::model::{Icon, IconSize};

const WHITE_RGB: u32 = 0x00FF_FFFF;

/// The translucent white square shown for entries without an icon and
/// painted over hidden entries.
pub fn placeholder_icon(size: IconSize, alpha: u8) -> Icon {
    let edge = size.pixels();
    Icon::filled(edge, edge, ((alpha as u32) << 24) | WHITE_RGB)
}

/// Paints `overlay` over `base` on a fresh canvas the size of `base`, then
/// keys out every pixel that matches the colour found at (1,1).
pub fn compose(base: Option<&Icon>, overlay: &Icon) -> Option<Icon> {
    let base = base?;
    let width = base.width();
    let height = base.height();
    let mut canvas = vec![0_u32; (width as usize) * (height as usize)];

    paint(&mut canvas, width, height, base);
    paint(&mut canvas, width, height, overlay);

    if width > 1 && height > 1 {
        let key = canvas[width as usize + 1];
        for pixel in canvas.iter_mut().filter(|pixel| **pixel == key) {
            *pixel = 0;
        }
    }

    Icon::new(width, height, canvas)
}

fn paint(canvas: &mut [u32], width: u32, height: u32, icon: &Icon) {
    let cols = width.min(icon.width()) as usize;
    let rows = height.min(icon.height()) as usize;
    let src_stride = icon.width() as usize;
    let dst_stride = width as usize;
    let src = icon.pixels();

    for y in 0..rows {
        let src_row = &src[y * src_stride..y * src_stride + cols];
        let dst_row = &mut canvas[y * dst_stride..y * dst_stride + cols];
        for (dst, src) in dst_row.iter_mut().zip(src_row) {
            *dst = blend_over(*dst, *src);
        }
    }
}

fn blend_over(dst: u32, src: u32) -> u32 {
    let src_a = src >> 24;
    if src_a == 0xFF {
        return src;
    }
    if src_a == 0 {
        return dst;
    }

    let dst_a = dst >> 24;
    let dst_weight = dst_a * (0xFF - src_a) / 0xFF;
    let out_a = src_a + dst_weight;
    if out_a == 0 {
        return 0;
    }

    let channel = |shift: u32| {
        let s = (src >> shift) & 0xFF;
        let d = (dst >> shift) & 0xFF;
        ((s * src_a + d * dst_weight) / out_a).min(0xFF)
    };

    (out_a << 24) | (channel(16) << 16) | (channel(8) << 8) | channel(0)
}

#[cfg(test)]
mod tests {
    use super::blend_over;

    #[test]
    fn opaque_source_replaces_destination() {
        assert_eq!(blend_over(0xFF00_0000, 0xFF12_3456), 0xFF12_3456);
    }

    #[test]
    fn transparent_source_keeps_destination() {
        assert_eq!(blend_over(0xFF12_3456, 0x00FF_FFFF), 0xFF12_3456);
    }

    #[test]
    fn half_white_over_opaque_black_is_mid_grey() {
        let blended = blend_over(0xFF00_0000, 0x80FF_FFFF);
        assert_eq!(blended >> 24, 0xFF);
        let red = (blended >> 16) & 0xFF;
        assert!((0x7F..=0x81).contains(&red), "red = {red:#x}");
    }
}
