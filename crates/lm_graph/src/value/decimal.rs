use core::fmt;

/// A base-10 fixed point number: `mantissa * 10^-scale`.
///
/// Values compare by representation, so `1.0` and `1.00` differ.
///
/// # Examples
///
/// ```
/// use lm_graph::value::Decimal;
///
/// let price = Decimal::new(1999, 2);
/// assert_eq!(price.to_string(), "19.99");
/// assert_eq!(Decimal::new(-5, 1).to_string(), "-0.5");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Decimal {
    mantissa: i128,
    scale: u8,
}

impl Decimal {
    #[inline]
    pub const fn new(mantissa: i128, scale: u8) -> Self {
        Self { mantissa, scale }
    }

    #[inline]
    pub const fn mantissa(self) -> i128 {
        self.mantissa
    }

    #[inline]
    pub const fn scale(self) -> u8 {
        self.scale
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.mantissa);
        }
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let digits = alloc::format!("{:0>width$}", self.mantissa.unsigned_abs(), width = self.scale as usize + 1);
        let (int, frac) = digits.split_at(digits.len() - self.scale as usize);
        write!(f, "{sign}{int}.{frac}")
    }
}
