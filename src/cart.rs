//! Shopping cart state and the reducer that drives it.
//!
//! Every mutation goes through [`Cart::apply`], which normalizes quantities
//! and recomputes totals. The same [`Pricing`] is used at checkout so the
//! amounts a customer sees in the cart match the order that gets placed.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pricing {
    pub shipping_fee: i64,
    pub free_shipping_threshold: i64,
    pub max_line_quantity: u32,
}

fn too_large() -> AppError {
    AppError::validation("order amount is too large")
}

impl Pricing {
    pub fn shipping_for(&self, subtotal: i64, item_count: u32) -> i64 {
        if item_count == 0 || subtotal >= self.free_shipping_threshold {
            0
        } else {
            self.shipping_fee
        }
    }

    /// Totals for arbitrary `(unit_price, quantity)` pairs. Amounts that do
    /// not fit in an `i64` are a validation error.
    pub fn totals<I>(&self, lines: I) -> Result<CartTotals>
    where
        I: IntoIterator<Item = (i64, u32)>,
    {
        let mut subtotal = 0_i64;
        let mut item_count = 0_u32;
        for (price, qty) in lines {
            subtotal = price
                .checked_mul(i64::from(qty))
                .and_then(|line| subtotal.checked_add(line))
                .ok_or_else(too_large)?;
            item_count = item_count.checked_add(qty).ok_or_else(too_large)?;
        }
        let shipping = self.shipping_for(subtotal, item_count);
        Ok(CartTotals {
            item_count,
            subtotal,
            shipping,
            total: subtotal.checked_add(shipping).ok_or_else(too_large)?,
        })
    }

    /// Totals for a mixed cart. Each bookstore ships its own order, so
    /// shipping is charged per bookstore group.
    pub fn cart_totals(&self, lines: &[CartLine]) -> Result<CartTotals> {
        let mut groups: BTreeMap<Option<i64>, Vec<(i64, u32)>> = BTreeMap::new();
        for line in lines {
            groups
                .entry(line.bookstore_id)
                .or_default()
                .push((line.unit_price, line.quantity));
        }
        let mut acc = CartTotals::default();
        for group in groups.into_values() {
            let t = self.totals(group)?;
            acc = CartTotals {
                item_count: acc.item_count.checked_add(t.item_count).ok_or_else(too_large)?,
                subtotal: acc.subtotal.checked_add(t.subtotal).ok_or_else(too_large)?,
                shipping: acc.shipping.checked_add(t.shipping).ok_or_else(too_large)?,
                total: acc.total.checked_add(t.total).ok_or_else(too_large)?,
            };
        }
        Ok(acc)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub book_id: i64,
    pub title: String,
    pub unit_price: i64,
    pub quantity: u32,
    pub bookstore_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    pub item_count: u32,
    pub subtotal: i64,
    pub shipping: i64,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartAction {
    Add(CartLine),
    SetQuantity { book_id: i64, quantity: u32 },
    Remove { book_id: i64 },
    Clear,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub items: Vec<CartLine>,
    pub totals: CartTotals,
}

impl Cart {
    /// Rebuild a cart from persisted lines, recomputing totals.
    pub fn from_lines(items: Vec<CartLine>, pricing: &Pricing) -> Result<Self> {
        let mut cart = Cart {
            items,
            totals: CartTotals::default(),
        };
        cart.normalize(pricing)?;
        Ok(cart)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, book_id: i64) -> bool {
        self.items.iter().any(|l| l.book_id == book_id)
    }

    /// Reduce `action` into the cart. On error the cart must not be saved.
    pub fn apply(&mut self, action: CartAction, pricing: &Pricing) -> Result<()> {
        match action {
            CartAction::Add(line) => {
                if let Some(existing) = self.items.iter_mut().find(|l| l.book_id == line.book_id) {
                    existing.quantity = existing.quantity.saturating_add(line.quantity);
                    // refresh snapshot fields with the latest catalog data
                    existing.title = line.title;
                    existing.unit_price = line.unit_price;
                    existing.bookstore_id = line.bookstore_id;
                } else if line.quantity > 0 {
                    self.items.push(line);
                }
            }
            CartAction::SetQuantity { book_id, quantity } => {
                if quantity == 0 {
                    self.items.retain(|l| l.book_id != book_id);
                } else if let Some(existing) = self.items.iter_mut().find(|l| l.book_id == book_id) {
                    existing.quantity = quantity;
                }
            }
            CartAction::Remove { book_id } => self.items.retain(|l| l.book_id != book_id),
            CartAction::Clear => self.items.clear(),
        }
        self.normalize(pricing)
    }

    fn normalize(&mut self, pricing: &Pricing) -> Result<()> {
        let max = pricing.max_line_quantity.max(1);
        self.items.retain(|l| l.quantity > 0);
        for line in &mut self.items {
            line.quantity = line.quantity.clamp(1, max);
        }
        self.totals = pricing.cart_totals(&self.items)?;
        Ok(())
    }
}
