//! Per-field-type compression strategies and the registry that binds them.
//!
//! The node codec never touches field payload bytes itself; it resolves the
//! field's declared type and hands the stream to whatever strategy is bound
//! for that type. Method 0 is the straight big-endian IEEE layout and is
//! bound for every non-node field type by default. Other methods are reserved
//! for per-field compression variants negotiated out of band.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::rc::Rc;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::warn;

use crate::dict::{read_utf, write_utf};
use crate::error::{Error, Result};
use crate::field::{FieldType, FieldValue};

/// Upper bound on a wire array length, so a corrupt count fails fast instead
/// of allocating.
const MAX_ARRAY_LEN: usize = 1 << 24;

/// A pluggable binary layout for a set of field types.
///
/// Array-typed fields are length-prefixed: the engine calls [`read_length`]
/// first, then [`decode_array`] for exactly that many elements. For tuple
/// types the length counts tuples, not scalars.
///
/// [`read_length`]: FieldCodec::read_length
/// [`decode_array`]: FieldCodec::decode_array
pub trait FieldCodec {
    /// Whether this strategy can handle the given (type, method) pair.
    fn supports(&self, field_type: FieldType, method: u8) -> bool;

    /// Reads the element count preceding an array payload.
    fn read_length(&self, r: &mut dyn Read) -> Result<usize>;

    fn decode_scalar(&self, r: &mut dyn Read, field_type: FieldType) -> Result<FieldValue>;

    fn decode_array(
        &self,
        r: &mut dyn Read,
        field_type: FieldType,
        len: usize,
    ) -> Result<FieldValue>;

    /// Writes one value, including the element count for array types.
    fn encode(&self, w: &mut dyn Write, value: &FieldValue) -> Result<()>;
}

/// Binds one strategy per field type. Lookup at decode/encode time is by
/// field type alone; an unbound type is a hard error.
pub struct FieldCodecRegistry {
    bindings: HashMap<FieldType, Rc<dyn FieldCodec>>,
}

impl FieldCodecRegistry {
    /// An empty registry with no strategies bound.
    pub fn empty() -> Self {
        FieldCodecRegistry {
            bindings: HashMap::new(),
        }
    }

    /// Binds `codec` for `field_type` under the given method. A strategy
    /// that does not support the pair is reported and ignored, leaving any
    /// previous binding in place.
    pub fn register(&mut self, field_type: FieldType, method: u8, codec: Rc<dyn FieldCodec>) {
        if !codec.supports(field_type, method) {
            warn!(
                "field codec rejected registration for {}/{}, keeping prior binding",
                field_type, method
            );
            return;
        }
        self.bindings.insert(field_type, codec);
    }

    fn get(&self, field_type: FieldType) -> Result<&dyn FieldCodec> {
        self.bindings
            .get(&field_type)
            .map(|c| c.as_ref())
            .ok_or(Error::UnsupportedFieldType(field_type))
    }

    /// Decodes one value of the declared type, reading the element count
    /// first for array types.
    pub fn decode(&self, r: &mut dyn Read, field_type: FieldType) -> Result<FieldValue> {
        let codec = self.get(field_type)?;
        if field_type.is_array() {
            let len = codec.read_length(r)?;
            codec.decode_array(r, field_type, len)
        } else {
            codec.decode_scalar(r, field_type)
        }
    }

    pub fn encode(&self, w: &mut dyn Write, value: &FieldValue) -> Result<()> {
        self.get(value.field_type())?.encode(w, value)
    }
}

impl Default for FieldCodecRegistry {
    /// Registry with the IEEE strategy bound for every non-node field type.
    fn default() -> Self {
        let mut reg = FieldCodecRegistry::empty();
        let ieee: Rc<dyn FieldCodec> = Rc::new(IeeeCodec);
        for ty in FieldType::ALL {
            if !matches!(ty, FieldType::Node | FieldType::NodeArray) {
                reg.register(ty, 0, ieee.clone());
            }
        }
        reg
    }
}

/// Method 0: straight big-endian IEEE encoding of every scalar, tuple, string
/// and array field type.
pub struct IeeeCodec;

fn read_tuple<const N: usize>(r: &mut dyn Read) -> Result<[f32; N]> {
    let mut out = [0.0f32; N];
    for v in &mut out {
        *v = r
            .read_f32::<BigEndian>()
            .map_err(|e| Error::at_step(e, "tuple payload"))?;
    }
    Ok(out)
}

fn write_tuple(w: &mut dyn Write, t: &[f32]) -> Result<()> {
    for v in t {
        w.write_f32::<BigEndian>(*v)?;
    }
    Ok(())
}

fn check_len(len: usize) -> Result<usize> {
    if len > MAX_ARRAY_LEN {
        return Err(Error::MalformedStream(format!(
            "array length {} above the {} limit",
            len, MAX_ARRAY_LEN
        )));
    }
    Ok(len)
}

fn write_len(w: &mut dyn Write, len: usize) -> Result<()> {
    u32::try_from(len)
        .map_err(|_| Error::BadEncode(format!("array of {} elements exceeds u32 count", len)))?;
    w.write_u32::<BigEndian>(len as u32)?;
    Ok(())
}

impl FieldCodec for IeeeCodec {
    fn supports(&self, field_type: FieldType, method: u8) -> bool {
        method == 0 && !matches!(field_type, FieldType::Node | FieldType::NodeArray)
    }

    fn read_length(&self, r: &mut dyn Read) -> Result<usize> {
        let len = r
            .read_u32::<BigEndian>()
            .map_err(|e| Error::at_step(e, "array length"))?;
        check_len(len as usize)
    }

    fn decode_scalar(&self, r: &mut dyn Read, field_type: FieldType) -> Result<FieldValue> {
        let step = "field payload";
        Ok(match field_type {
            FieldType::Bool => {
                FieldValue::Bool(r.read_u8().map_err(|e| Error::at_step(e, step))? != 0)
            }
            FieldType::Int32 => FieldValue::Int32(
                r.read_i32::<BigEndian>()
                    .map_err(|e| Error::at_step(e, step))?,
            ),
            FieldType::Float => FieldValue::Float(
                r.read_f32::<BigEndian>()
                    .map_err(|e| Error::at_step(e, step))?,
            ),
            FieldType::Double => FieldValue::Double(
                r.read_f64::<BigEndian>()
                    .map_err(|e| Error::at_step(e, step))?,
            ),
            FieldType::Time => FieldValue::Time(
                r.read_f64::<BigEndian>()
                    .map_err(|e| Error::at_step(e, step))?,
            ),
            FieldType::String => FieldValue::String(read_utf(r, "string payload")?),
            FieldType::Vec2 => FieldValue::Vec2(read_tuple(r)?),
            FieldType::Vec3 => FieldValue::Vec3(read_tuple(r)?),
            FieldType::Color => FieldValue::Color(read_tuple(r)?),
            FieldType::ColorRgba => FieldValue::ColorRgba(read_tuple(r)?),
            FieldType::Rotation => FieldValue::Rotation(read_tuple(r)?),
            _ => return Err(Error::UnsupportedFieldType(field_type)),
        })
    }

    fn decode_array(
        &self,
        r: &mut dyn Read,
        field_type: FieldType,
        len: usize,
    ) -> Result<FieldValue> {
        let step = "array payload";
        macro_rules! scalars {
            ($variant:ident, $read:expr) => {{
                let mut out = Vec::with_capacity(len);
                for _ in 0..len {
                    out.push($read);
                }
                FieldValue::$variant(out)
            }};
        }
        Ok(match field_type {
            FieldType::BoolArray => {
                scalars!(BoolArray, r.read_u8().map_err(|e| Error::at_step(e, step))? != 0)
            }
            FieldType::Int32Array => scalars!(
                Int32Array,
                r.read_i32::<BigEndian>()
                    .map_err(|e| Error::at_step(e, step))?
            ),
            FieldType::FloatArray => scalars!(
                FloatArray,
                r.read_f32::<BigEndian>()
                    .map_err(|e| Error::at_step(e, step))?
            ),
            FieldType::DoubleArray => scalars!(
                DoubleArray,
                r.read_f64::<BigEndian>()
                    .map_err(|e| Error::at_step(e, step))?
            ),
            FieldType::TimeArray => scalars!(
                TimeArray,
                r.read_f64::<BigEndian>()
                    .map_err(|e| Error::at_step(e, step))?
            ),
            FieldType::StringArray => scalars!(StringArray, read_utf(r, "string payload")?),
            FieldType::Vec2Array => scalars!(Vec2Array, read_tuple(r)?),
            FieldType::Vec3Array => scalars!(Vec3Array, read_tuple(r)?),
            FieldType::ColorArray => scalars!(ColorArray, read_tuple(r)?),
            FieldType::ColorRgbaArray => scalars!(ColorRgbaArray, read_tuple(r)?),
            FieldType::RotationArray => scalars!(RotationArray, read_tuple(r)?),
            _ => return Err(Error::UnsupportedFieldType(field_type)),
        })
    }

    fn encode(&self, w: &mut dyn Write, value: &FieldValue) -> Result<()> {
        match value {
            FieldValue::Bool(v) => w.write_u8(*v as u8)?,
            FieldValue::Int32(v) => w.write_i32::<BigEndian>(*v)?,
            FieldValue::Float(v) => w.write_f32::<BigEndian>(*v)?,
            FieldValue::Double(v) | FieldValue::Time(v) => w.write_f64::<BigEndian>(*v)?,
            FieldValue::String(v) => write_utf(w, v)?,
            FieldValue::Vec2(v) => write_tuple(w, v)?,
            FieldValue::Vec3(v) | FieldValue::Color(v) => write_tuple(w, v)?,
            FieldValue::ColorRgba(v) | FieldValue::Rotation(v) => write_tuple(w, v)?,
            FieldValue::BoolArray(v) => {
                write_len(w, v.len())?;
                for b in v {
                    w.write_u8(*b as u8)?;
                }
            }
            FieldValue::Int32Array(v) => {
                write_len(w, v.len())?;
                for i in v {
                    w.write_i32::<BigEndian>(*i)?;
                }
            }
            FieldValue::FloatArray(v) => {
                write_len(w, v.len())?;
                for f in v {
                    w.write_f32::<BigEndian>(*f)?;
                }
            }
            FieldValue::DoubleArray(v) | FieldValue::TimeArray(v) => {
                write_len(w, v.len())?;
                for f in v {
                    w.write_f64::<BigEndian>(*f)?;
                }
            }
            FieldValue::StringArray(v) => {
                write_len(w, v.len())?;
                for s in v {
                    write_utf(w, s)?;
                }
            }
            FieldValue::Vec2Array(v) => {
                write_len(w, v.len())?;
                for t in v {
                    write_tuple(w, t)?;
                }
            }
            FieldValue::Vec3Array(v) | FieldValue::ColorArray(v) => {
                write_len(w, v.len())?;
                for t in v {
                    write_tuple(w, t)?;
                }
            }
            FieldValue::ColorRgbaArray(v) | FieldValue::RotationArray(v) => {
                write_len(w, v.len())?;
                for t in v {
                    write_tuple(w, t)?;
                }
            }
            FieldValue::Node(_) | FieldValue::NodeArray(_) => {
                return Err(Error::UnsupportedFieldType(value.field_type()))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: FieldValue) {
        let reg = FieldCodecRegistry::default();
        let mut buf = Vec::new();
        reg.encode(&mut buf, &value).unwrap();
        let got = reg.decode(&mut &buf[..], value.field_type()).unwrap();
        assert_eq!(got, value);
    }

    #[test]
    fn scalar_round_trips() {
        round_trip(FieldValue::Bool(true));
        round_trip(FieldValue::Int32(-40000));
        round_trip(FieldValue::Float(1.5));
        round_trip(FieldValue::Double(std::f64::consts::PI));
        round_trip(FieldValue::Time(12.25));
        round_trip(FieldValue::String("hello scene".into()));
        round_trip(FieldValue::Vec2([0.5, -0.5]));
        round_trip(FieldValue::Vec3([1.0, 2.0, 3.0]));
        round_trip(FieldValue::ColorRgba([0.1, 0.2, 0.3, 1.0]));
        round_trip(FieldValue::Rotation([0.0, 1.0, 0.0, 3.14]));
    }

    #[test]
    fn array_round_trips() {
        round_trip(FieldValue::Int32Array(vec![1, -2, 3]));
        round_trip(FieldValue::StringArray(vec!["a".into(), "".into()]));
        round_trip(FieldValue::Vec3Array(vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]));
        round_trip(FieldValue::BoolArray(vec![true, false, true]));
    }

    #[test]
    fn empty_array_is_not_an_error() {
        round_trip(FieldValue::FloatArray(vec![]));
        round_trip(FieldValue::Vec2Array(vec![]));
        round_trip(FieldValue::StringArray(vec![]));
    }

    #[test]
    fn tuple_array_length_counts_tuples() {
        let reg = FieldCodecRegistry::default();
        let mut buf = Vec::new();
        reg.encode(
            &mut buf,
            &FieldValue::Vec3Array(vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]),
        )
        .unwrap();
        // u32 count of 2 tuples, then 6 floats.
        assert_eq!(buf.len(), 4 + 6 * 4);
        assert_eq!(&buf[..4], &[0, 0, 0, 2]);
    }

    #[test]
    fn float_is_big_endian_ieee() {
        let reg = FieldCodecRegistry::default();
        let mut buf = Vec::new();
        reg.encode(&mut buf, &FieldValue::Float(1.0)).unwrap();
        assert_eq!(buf, vec![0x3F, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn truncated_payload() {
        let reg = FieldCodecRegistry::default();
        let buf = [0x3Fu8, 0x80];
        assert!(matches!(
            reg.decode(&mut &buf[..], FieldType::Float),
            Err(Error::Truncated { .. })
        ));
    }

    #[test]
    fn unbound_type_is_hard_error() {
        let reg = FieldCodecRegistry::empty();
        let buf = [0u8; 4];
        assert!(matches!(
            reg.decode(&mut &buf[..], FieldType::Int32),
            Err(Error::UnsupportedFieldType(FieldType::Int32))
        ));
    }

    #[test]
    fn unsupported_registration_is_ignored() {
        struct IntOnly;
        impl FieldCodec for IntOnly {
            fn supports(&self, field_type: FieldType, method: u8) -> bool {
                field_type == FieldType::Int32 && method == 0
            }
            fn read_length(&self, _: &mut dyn Read) -> Result<usize> {
                unreachable!()
            }
            fn decode_scalar(&self, r: &mut dyn Read, _: FieldType) -> Result<FieldValue> {
                Ok(FieldValue::Int32(
                    r.read_i32::<BigEndian>().map_err(Error::Io)?,
                ))
            }
            fn decode_array(&self, _: &mut dyn Read, _: FieldType, _: usize) -> Result<FieldValue> {
                unreachable!()
            }
            fn encode(&self, _: &mut dyn Write, _: &FieldValue) -> Result<()> {
                unreachable!()
            }
        }

        let mut reg = FieldCodecRegistry::default();
        // Rejected: prior IEEE binding for Float stays in place.
        reg.register(FieldType::Float, 0, Rc::new(IntOnly));
        let mut buf = Vec::new();
        reg.encode(&mut buf, &FieldValue::Float(2.0)).unwrap();
        assert_eq!(
            reg.decode(&mut &buf[..], FieldType::Float).unwrap(),
            FieldValue::Float(2.0)
        );

        // Accepted: Int32/0 is supported.
        reg.register(FieldType::Int32, 0, Rc::new(IntOnly));
        let buf = 7i32.to_be_bytes();
        assert_eq!(
            reg.decode(&mut &buf[..], FieldType::Int32).unwrap(),
            FieldValue::Int32(7)
        );
    }
}
