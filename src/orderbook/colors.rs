//! Color assignment for rendered orders
//!
//! Bids use a blue gradient, asks an orange one; darker shades sit at the
//! front of the queue. The side-wide largest order is painted gold and the
//! strictly smaller runner-up dark gold, regardless of mode.

use rust_decimal::Decimal;

use super::cluster::ClusteredOrder;
use super::Side;

/// An RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Blue gradient for bid orders, light to dark
pub const BID_COLORS: [Color; 10] = [
    Color::new(222, 235, 247),
    Color::new(204, 227, 245),
    Color::new(158, 202, 225),
    Color::new(129, 189, 231),
    Color::new(107, 174, 214),
    Color::new(78, 157, 202),
    Color::new(49, 130, 189),
    Color::new(33, 113, 181),
    Color::new(16, 96, 168),
    Color::new(8, 81, 156),
];

/// Orange gradient for ask orders, light to dark
pub const ASK_COLORS: [Color; 10] = [
    Color::new(254, 230, 206),
    Color::new(253, 216, 186),
    Color::new(253, 174, 107),
    Color::new(253, 159, 88),
    Color::new(253, 141, 60),
    Color::new(245, 126, 47),
    Color::new(230, 85, 13),
    Color::new(204, 75, 12),
    Color::new(179, 65, 10),
    Color::new(166, 54, 3),
];

/// Highlight for the side's largest order
pub const GOLD: Color = Color::new(255, 215, 0);
/// Highlight for the second-largest order
pub const DARK_GOLD: Color = Color::new(184, 134, 11);

fn palette(side: Side) -> &'static [Color; 10] {
    if side.is_bid() {
        &BID_COLORS
    } else {
        &ASK_COLORS
    }
}

/// Color by queue position, clamped to the palette's darkest entry
fn position_color(index: usize, side: Side) -> Color {
    let palette = palette(side);
    palette[index.min(palette.len() - 1)]
}

/// Color by cluster label, cycling through the palette
fn cluster_color(cluster: usize, side: Side) -> Color {
    let palette = palette(side);
    palette[cluster % palette.len()]
}

/// Gold/dark-gold for the side-wide largest and second-largest orders
fn special_color(qty: Decimal, max_order: Decimal, second_max: Decimal) -> Option<Color> {
    if qty == max_order {
        Some(GOLD)
    } else if qty == second_max {
        Some(DARK_GOLD)
    } else {
        None
    }
}

/// Hex colors for a level's orders in queue-position mode
pub fn order_colors(
    orders: &[Decimal],
    side: Side,
    max_order: Decimal,
    second_max: Decimal,
) -> Vec<String> {
    orders
        .iter()
        .enumerate()
        .map(|(i, &qty)| {
            special_color(qty, max_order, second_max)
                .unwrap_or_else(|| position_color(i, side))
                .to_hex()
        })
        .collect()
}

/// Hex colors for a level's orders in clustering mode
pub fn clustered_order_colors(
    orders: &[ClusteredOrder],
    side: Side,
    max_order: Decimal,
    second_max: Decimal,
) -> Vec<String> {
    orders
        .iter()
        .map(|order| {
            special_color(order.qty, max_order, second_max)
                .unwrap_or_else(|| cluster_color(order.cluster, side))
                .to_hex()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_hex_formatting() {
        assert_eq!(GOLD.to_hex(), "#ffd700");
        assert_eq!(Color::new(8, 81, 156).to_hex(), "#08519c");
    }

    #[test]
    fn test_global_max_is_gold() {
        let colors = order_colors(
            &[dec!(1), dec!(20), dec!(5)],
            Side::Bid,
            dec!(20),
            dec!(5),
        );
        assert_eq!(colors[1], GOLD.to_hex());
        assert_eq!(colors[2], DARK_GOLD.to_hex());
        assert_eq!(colors[0], BID_COLORS[0].to_hex());
    }

    #[test]
    fn test_position_colors_clamp_to_darkest() {
        let orders = vec![dec!(1); 15];
        // No highlights: max/second-max not present in the level
        let colors = order_colors(&orders, Side::Ask, dec!(100), dec!(50));
        assert_eq!(colors[0], ASK_COLORS[0].to_hex());
        assert_eq!(colors[14], ASK_COLORS[9].to_hex());
    }

    #[test]
    fn test_cluster_colors_cycle() {
        let orders: Vec<ClusteredOrder> = (0..12)
            .map(|i| ClusteredOrder {
                qty: dec!(1),
                cluster: i,
            })
            .collect();
        let colors = clustered_order_colors(&orders, Side::Bid, dec!(100), dec!(50));
        assert_eq!(colors[0], BID_COLORS[0].to_hex());
        assert_eq!(colors[10], BID_COLORS[0].to_hex());
        assert_eq!(colors[11], BID_COLORS[1].to_hex());
    }
}
