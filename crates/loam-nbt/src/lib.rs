//! Named binary tags in the Bedrock network layout: little-endian fixed
//! width values, varint string lengths, zigzag varint ints, longs and array
//! lengths.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::io::{self, Read, Write};

pub mod varint;

/// Compounds and lists nested deeper than this are rejected.
const MAX_DEPTH: usize = 512;

/// Upper bound for up-front allocations driven by a length prefix.
const MAX_PREALLOC: usize = 4096;

#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    End,
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<i8>),
    String(String),
    List(Vec<Tag>),
    Compound(HashMap<String, Tag>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn read_len<R: Read>(reader: &mut R) -> io::Result<usize> {
    let length = varint::read_zigzag_i32(reader)?;
    usize::try_from(length).map_err(|_| invalid(format!("Negative length: {}", length)))
}

fn write_len<W: Write>(writer: &mut W, len: usize) -> io::Result<()> {
    varint::write_zigzag_i32(writer, len as i32)
}

fn read_str<R: Read>(reader: &mut R) -> io::Result<String> {
    let length = varint::read_var_u32(reader)? as usize;
    let mut bytes = Vec::with_capacity(length.min(MAX_PREALLOC));
    (&mut *reader).take(length as u64).read_to_end(&mut bytes)?;
    if bytes.len() != length {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "Not enough bytes to read the full string",
        ));
    }
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn write_str<W: Write>(writer: &mut W, value: &str) -> io::Result<()> {
    varint::write_var_u32(writer, value.len() as u32)?;
    writer.write_all(value.as_bytes())
}

impl Tag {
    pub fn get_type_id(&self) -> u8 {
        match self {
            Tag::End => 0,
            Tag::Byte(_) => 1,
            Tag::Short(_) => 2,
            Tag::Int(_) => 3,
            Tag::Long(_) => 4,
            Tag::Float(_) => 5,
            Tag::Double(_) => 6,
            Tag::ByteArray(_) => 7,
            Tag::String(_) => 8,
            Tag::List(_) => 9,
            Tag::Compound(_) => 10,
            Tag::IntArray(_) => 11,
            Tag::LongArray(_) => 12,
        }
    }

    /// Reads one named tag. A lone `TAG_End` yields an empty name and `Tag::End`.
    pub fn read<R: Read>(reader: &mut R) -> io::Result<(String, Tag)> {
        Tag::read_named(reader, 0)
    }

    fn read_named<R: Read>(reader: &mut R, depth: usize) -> io::Result<(String, Tag)> {
        let type_id = reader.read_u8()?;
        if type_id == 0 {
            return Ok(("".to_owned(), Tag::End));
        }

        let name = read_str(reader)?;
        let tag = Tag::read_payload(reader, type_id, depth)?;
        Ok((name, tag))
    }

    fn read_payload<R: Read>(
        reader: &mut R,
        type_id: u8,
        depth: usize,
    ) -> io::Result<Tag> {
        if depth > MAX_DEPTH {
            return Err(invalid(format!("NBT nested deeper than {}", MAX_DEPTH)));
        }

        match type_id {
            0 => Ok(Tag::End),
            1 => Ok(Tag::Byte(reader.read_i8()?)),
            2 => Ok(Tag::Short(reader.read_i16::<LittleEndian>()?)),
            3 => Ok(Tag::Int(varint::read_zigzag_i32(reader)?)),
            4 => Ok(Tag::Long(varint::read_zigzag_i64(reader)?)),
            5 => Ok(Tag::Float(reader.read_f32::<LittleEndian>()?)),
            6 => Ok(Tag::Double(reader.read_f64::<LittleEndian>()?)),
            7 => {
                let length = read_len(reader)?;
                let mut bytes = Vec::with_capacity(length.min(MAX_PREALLOC));
                for _ in 0..length {
                    bytes.push(reader.read_i8()?);
                }
                Ok(Tag::ByteArray(bytes))
            }
            8 => Ok(Tag::String(read_str(reader)?)),
            9 => {
                let list_type = reader.read_u8()?;
                let length = read_len(reader)?;
                let mut list = Vec::with_capacity(length.min(MAX_PREALLOC));
                for _ in 0..length {
                    list.push(Tag::read_payload(reader, list_type, depth + 1)?);
                }
                Ok(Tag::List(list))
            }
            10 => {
                let mut compound = HashMap::new();
                loop {
                    let (name, tag) = Tag::read_named(reader, depth + 1)?;
                    if let Tag::End = tag {
                        break;
                    }
                    compound.insert(name, tag);
                }
                Ok(Tag::Compound(compound))
            }
            11 => {
                let length = read_len(reader)?;
                let mut ints = Vec::with_capacity(length.min(MAX_PREALLOC));
                for _ in 0..length {
                    ints.push(varint::read_zigzag_i32(reader)?);
                }
                Ok(Tag::IntArray(ints))
            }
            12 => {
                let length = read_len(reader)?;
                let mut longs = Vec::with_capacity(length.min(MAX_PREALLOC));
                for _ in 0..length {
                    longs.push(varint::read_zigzag_i64(reader)?);
                }
                Ok(Tag::LongArray(longs))
            }
            _ => Err(invalid(format!("Invalid tag type: {}", type_id))),
        }
    }

    pub fn write<W: Write>(&self, writer: &mut W, name: &str) -> io::Result<()> {
        writer.write_u8(self.get_type_id())?;

        if !matches!(self, Tag::End) {
            write_str(writer, name)?;
        }

        self.write_payload(writer)
    }

    fn write_payload<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            Tag::End => Ok(()),
            Tag::Byte(v) => writer.write_i8(*v),
            Tag::Short(v) => writer.write_i16::<LittleEndian>(*v),
            Tag::Int(v) => varint::write_zigzag_i32(writer, *v),
            Tag::Long(v) => varint::write_zigzag_i64(writer, *v),
            Tag::Float(v) => writer.write_f32::<LittleEndian>(*v),
            Tag::Double(v) => writer.write_f64::<LittleEndian>(*v),
            Tag::ByteArray(v) => {
                write_len(writer, v.len())?;
                for &b in v {
                    writer.write_i8(b)?;
                }
                Ok(())
            }
            Tag::String(v) => write_str(writer, v),
            Tag::List(v) => {
                if v.is_empty() {
                    writer.write_u8(0)?; // TAG_End for empty lists
                } else {
                    writer.write_u8(v[0].get_type_id())?;
                }
                write_len(writer, v.len())?;
                for tag in v {
                    tag.write_payload(writer)?;
                }
                Ok(())
            }
            Tag::Compound(v) => {
                for (name, tag) in v {
                    tag.write(writer, name)?;
                }
                Tag::End.write(writer, "")
            }
            Tag::IntArray(v) => {
                write_len(writer, v.len())?;
                for &i in v {
                    varint::write_zigzag_i32(writer, i)?;
                }
                Ok(())
            }
            Tag::LongArray(v) => {
                write_len(writer, v.len())?;
                for &l in v {
                    varint::write_zigzag_i64(writer, l)?;
                }
                Ok(())
            }
        }
    }

    pub fn as_compound(&self) -> Option<&HashMap<String, Tag>> {
        match self {
            Tag::Compound(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Tag>> {
        match self {
            Tag::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&String> {
        match self {
            Tag::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Tag::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Looks up `key` when this is a compound.
    pub fn get(&self, key: &str) -> Option<&Tag> {
        self.as_compound()?.get(key)
    }
}
