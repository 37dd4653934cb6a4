//! Serde support for the `bls12_381` types that appear in channel messages.
//!
//! [`SerializeElement`] has the `serialize`/`deserialize` pair Serde expects from a `with` module,
//! so a field is annotated with `#[serde(with = "SerializeElement")]`. Points travel in the
//! compressed form produced by `bls12_381`. Decoding goes through `from_compressed`, which checks
//! both the curve equation and subgroup membership: a decoded point is always usable.

use crate::common::*;
use arrayvec::ArrayVec;
use serde::{
    de::{self, SeqAccess, Visitor},
    ser::SerializeSeq,
    Deserialize, Deserializer, Serialize, Serializer,
};
use std::{fmt, marker::PhantomData};

/// Encoding of a foreign curve type, usable as a Serde `with` module.
pub trait SerializeElement: Sized {
    /// Write `value` to `serializer`.
    fn serialize<S: Serializer>(value: &Self, serializer: S) -> Result<S::Ok, S::Error>;

    /// Read a value back, rejecting any encoding that is not a valid element.
    fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error>;
}

// Borrowing adapter so a single element can be handed to `SerializeSeq`.
struct Out<'a, G>(&'a G);

impl<G: SerializeElement> Serialize for Out<'_, G> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        G::serialize(self.0, serializer)
    }
}

// Owning adapter so a single element can be pulled out of `SeqAccess`.
struct In<G>(G);

impl<'de, G: SerializeElement> Deserialize<'de> for In<G> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        G::deserialize(deserializer).map(In)
    }
}

macro_rules! compressed_point {
    ($affine:ty, $projective:ty, $name:literal) => {
        impl SerializeElement for $affine {
            fn serialize<S: Serializer>(value: &Self, serializer: S) -> Result<S::Ok, S::Error> {
                serde_big_array::BigArray::serialize(&value.to_compressed(), serializer)
            }

            fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let bytes = serde_big_array::BigArray::deserialize(deserializer)?;
                Option::<$affine>::from(<$affine>::from_compressed(&bytes))
                    .ok_or_else(|| de::Error::custom(concat!("bytes are not a valid ", $name, " point")))
            }
        }

        impl SerializeElement for $projective {
            fn serialize<S: Serializer>(value: &Self, serializer: S) -> Result<S::Ok, S::Error> {
                <$affine as SerializeElement>::serialize(&<$affine>::from(value), serializer)
            }

            fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                <$affine as SerializeElement>::deserialize(deserializer).map(<$projective>::from)
            }
        }
    };
}

compressed_point!(G1Affine, G1Projective, "G1");
compressed_point!(G2Affine, G2Projective, "G2");

impl SerializeElement for Scalar {
    fn serialize<S: Serializer>(value: &Self, serializer: S) -> Result<S::Ok, S::Error> {
        value.to_bytes().serialize(serializer)
    }

    fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = <[u8; 32]>::deserialize(deserializer)?;
        Option::<Scalar>::from(Scalar::from_bytes(&bytes))
            .ok_or_else(|| de::Error::custom("bytes are not a canonical scalar"))
    }
}

fn serialize_all<'a, G, S>(
    items: impl ExactSizeIterator<Item = &'a G>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    G: SerializeElement + 'a,
    S: Serializer,
{
    let mut seq = serializer.serialize_seq(Some(items.len()))?;
    for item in items {
        seq.serialize_element(&Out(item))?;
    }
    seq.end()
}

/// Collects a sequence of elements into `C`, failing if `push` refuses one.
struct Collect<G, C> {
    expecting: &'static str,
    _marker: PhantomData<(G, C)>,
}

trait Collection<G>: Sized {
    fn with_capacity(hint: usize) -> Self;
    fn push(&mut self, item: G) -> bool;
}

impl<G> Collection<G> for Vec<G> {
    fn with_capacity(hint: usize) -> Self {
        Vec::with_capacity(hint)
    }

    fn push(&mut self, item: G) -> bool {
        Vec::push(self, item);
        true
    }
}

impl<G, const N: usize> Collection<G> for ArrayVec<G, N> {
    fn with_capacity(_: usize) -> Self {
        ArrayVec::new()
    }

    fn push(&mut self, item: G) -> bool {
        self.try_push(item).is_ok()
    }
}

impl<'de, G: SerializeElement, C: Collection<G>> Visitor<'de> for Collect<G, C> {
    type Value = C;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.expecting)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<C, A::Error> {
        let mut out = C::with_capacity(seq.size_hint().unwrap_or(0));
        let mut count = 0;
        while let Some(In(item)) = seq.next_element::<In<G>>()? {
            count += 1;
            if !out.push(item) {
                return Err(de::Error::invalid_length(count, &self));
            }
        }
        Ok(out)
    }
}

fn collect<'de, G, C, D>(deserializer: D, expecting: &'static str) -> Result<C, D::Error>
where
    G: SerializeElement,
    C: Collection<G>,
    D: Deserializer<'de>,
{
    deserializer.deserialize_seq(Collect::<G, C> {
        expecting,
        _marker: PhantomData,
    })
}

impl<G: SerializeElement> SerializeElement for Vec<G> {
    fn serialize<S: Serializer>(value: &Self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_all(value.iter(), serializer)
    }

    fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        collect::<G, Vec<G>, D>(deserializer, "a list of group elements or scalars")
    }
}

impl<G: SerializeElement, const N: usize> SerializeElement for [G; N] {
    fn serialize<S: Serializer>(value: &Self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_all(value.iter(), serializer)
    }

    fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        collect::<G, ArrayVec<G, N>, D>(deserializer, "a fixed-length list of elements")?
            .into_inner()
            .map_err(|short| de::Error::invalid_length(short.len(), &"a full array"))
    }
}

impl<G: SerializeElement, const N: usize> SerializeElement for Box<[G; N]> {
    fn serialize<S: Serializer>(value: &Self, serializer: S) -> Result<S::Ok, S::Error> {
        <[G; N] as SerializeElement>::serialize(value, serializer)
    }

    fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        <[G; N] as SerializeElement>::deserialize(deserializer).map(Box::new)
    }
}
