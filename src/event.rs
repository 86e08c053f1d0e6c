// src/event.rs

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side { Buy, Sell }

impl Side {
    /// Feed direction code: 1 is a buy, every other value a sell.
    #[inline]
    pub fn from_direction(direction: i32) -> Self {
        if direction == 1 { Side::Buy } else { Side::Sell }
    }

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self { Side::Buy => "bid", Side::Sell => "ask" }
    }
}

pub mod event_type {
    pub const ADD: i32 = 1;
    pub const CANCEL: i32 = 2;
    pub const DELETE: i32 = 3;
    pub const EXECUTE: i32 = 4;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Add { order_id: i64, qty: u32, price: i64, side: Side },
    /// Partial cancellation: `qty` is the amount removed, not the new size.
    Cancel { order_id: i64, qty: u32 },
    Delete { order_id: i64 },
    /// Execution against a resting order; the counterparty is not in the feed.
    Execute { order_id: i64, qty: u32 },
}

impl Event {
    /// Decode the raw feed fields. Codes outside 1..=4 (hidden executions,
    /// crosses, halts) carry nothing the book can apply and yield `None`.
    pub fn decode(event_type: i32, order_id: i64, quantity: u32, price: i64, direction: i32) -> Option<Self> {
        match event_type {
            event_type::ADD => Some(Event::Add {
                order_id,
                qty: quantity,
                price,
                side: Side::from_direction(direction),
            }),
            event_type::CANCEL => Some(Event::Cancel { order_id, qty: quantity }),
            event_type::DELETE => Some(Event::Delete { order_id }),
            event_type::EXECUTE => Some(Event::Execute { order_id, qty: quantity }),
            _ => None,
        }
    }

    #[inline]
    pub fn order_id(&self) -> i64 {
        match *self {
            Event::Add { order_id, .. }
            | Event::Cancel { order_id, .. }
            | Event::Delete { order_id }
            | Event::Execute { order_id, .. } => order_id,
        }
    }

    #[inline]
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Add { .. } => "add",
            Event::Cancel { .. } => "cancel",
            Event::Delete { .. } => "delete",
            Event::Execute { .. } => "execute",
        }
    }
}

/// One feed line with typed fields, before event decoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    /// Seconds after midnight.
    pub timestamp: f64,
    pub event_type: i32,
    pub order_id: i64,
    pub quantity: u32,
    /// Integer ticks; display price is ticks / 10000.
    pub price: i64,
    pub direction: i32,
}

impl Record {
    #[inline]
    pub fn event(&self) -> Option<Event> {
        Event::decode(self.event_type, self.order_id, self.quantity, self.price, self.direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_known_codes() {
        assert_eq!(
            Event::decode(1, 7, 100, 15000, 1),
            Some(Event::Add { order_id: 7, qty: 100, price: 15000, side: Side::Buy })
        );
        assert_eq!(Event::decode(2, 7, 30, 15000, 1), Some(Event::Cancel { order_id: 7, qty: 30 }));
        assert_eq!(Event::decode(3, 7, 0, 0, -1), Some(Event::Delete { order_id: 7 }));
        assert_eq!(Event::decode(4, 7, 5, 15000, -1), Some(Event::Execute { order_id: 7, qty: 5 }));
    }

    #[test]
    fn unsupported_codes_decode_to_none() {
        for code in [0, 5, 6, 7, -1, 42] {
            assert_eq!(Event::decode(code, 1, 1, 1, 1), None, "code {code}");
        }
    }

    #[test]
    fn any_non_buy_direction_is_sell() {
        assert_eq!(Side::from_direction(1), Side::Buy);
        assert_eq!(Side::from_direction(-1), Side::Sell);
        assert_eq!(Side::from_direction(0), Side::Sell);
        assert_eq!(Side::from_direction(2), Side::Sell);
    }
}
