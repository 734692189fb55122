use crate::AsBytes;

// The storage engine writes every fixed-width value little-endian.
macro_rules! number_impls {
    ($($type:ty),+) => {
        $(
            impl crate::AsBytes for $type {
                type Repr = [u8; ::std::mem::size_of::<$type>()];

                fn serialize(&self) -> Self::Repr {
                    self.to_le_bytes()
                }

                fn deserialize(src: Self::Repr) -> Self {
                    Self::from_le_bytes(src)
                }
            }
        )+
    }
}

number_impls![u8, u16, u32, u64, i8, i16, i32, i64, f32, f64];

/// Any non-zero byte is `true`; the engine stores bit columns as `0x00`/`0xFF`.
impl AsBytes for bool {
    type Repr = [u8; 1];

    fn serialize(&self) -> Self::Repr {
        [if *self { 0xFF } else { 0x00 }]
    }

    fn deserialize(src: Self::Repr) -> Self {
        src[0] != 0
    }
}
