//! Field layouts of the floating-point formats.
//!
//! Pure bit manipulation: splitting a packed value into sign, biased exponent
//! and mantissa fields, and packing them back. No rounding and no special
//! casing of infinities or NaNs happens here; that lives in [`crate::scalar`].

/// Bit layout of a binary floating-point format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatLayout {
    pub name: &'static str,
    pub width: u32,
    pub exponent_bits: u32,
    pub mantissa_bits: u32,
    pub bias: i32,
}

/// Unpacked fields, each right-aligned in a `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fields {
    pub sign: u32,
    pub exponent: u32,
    pub mantissa: u32,
}

pub const F32: FloatLayout = FloatLayout {
    name: "f32",
    width: 32,
    exponent_bits: 8,
    mantissa_bits: 23,
    bias: 127,
};

pub const F16: FloatLayout = FloatLayout {
    name: "f16",
    width: 16,
    exponent_bits: 5,
    mantissa_bits: 10,
    bias: 15,
};

pub const BF16: FloatLayout = FloatLayout {
    name: "bf16",
    width: 16,
    exponent_bits: 8,
    mantissa_bits: 7,
    bias: 127,
};

impl FloatLayout {
    #[inline(always)]
    pub const fn mantissa_mask(&self) -> u32 {
        (1 << self.mantissa_bits) - 1
    }

    /// All-ones exponent field (infinity / NaN).
    #[inline(always)]
    pub const fn exponent_max(&self) -> u32 {
        (1 << self.exponent_bits) - 1
    }

    /// Mantissa bit that distinguishes quiet from signaling NaNs.
    #[inline(always)]
    pub const fn quiet_bit(&self) -> u32 {
        1 << (self.mantissa_bits - 1)
    }

    #[inline(always)]
    const fn sign_shift(&self) -> u32 {
        self.width - 1
    }

    #[inline(always)]
    pub const fn unpack(&self, bits: u32) -> Fields {
        Fields {
            sign: (bits >> self.sign_shift()) & 1,
            exponent: (bits >> self.mantissa_bits) & self.exponent_max(),
            mantissa: bits & self.mantissa_mask(),
        }
    }

    /// Inverse of [`FloatLayout::unpack`]. Fields wider than their slot are masked.
    #[inline(always)]
    pub const fn pack(&self, fields: Fields) -> u32 {
        ((fields.sign & 1) << self.sign_shift())
            | ((fields.exponent & self.exponent_max()) << self.mantissa_bits)
            | (fields.mantissa & self.mantissa_mask())
    }

    /// The value pattern of a signed infinity.
    #[inline(always)]
    pub const fn infinity(&self, sign: u32) -> u32 {
        self.pack(Fields {
            sign,
            exponent: self.exponent_max(),
            mantissa: 0,
        })
    }

    #[inline(always)]
    pub const fn is_nan(&self, bits: u32) -> bool {
        let fields = self.unpack(bits);
        fields.exponent == self.exponent_max() && fields.mantissa != 0
    }

    #[inline(always)]
    pub const fn is_infinite(&self, bits: u32) -> bool {
        let fields = self.unpack(bits);
        fields.exponent == self.exponent_max() && fields.mantissa == 0
    }
}
