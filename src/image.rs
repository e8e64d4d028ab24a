//! The assembled output format: one `Image` holding the three fixed
//! sections plus the address↔line map, serialized length-prefixed and
//! little-endian. Replaces what used to be two near-identical
//! "executable" types living in separate crates with a single canonical
//! home for the assembled-program type.

use crate::constants::Endian;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::prelude::*;
use std::io::{BufReader, BufWriter};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Section {
    pub base: u32,
    pub bytes: Vec<u8>,
}

/// `addr -> source lines` and the inverse `line -> addr`, as produced by
/// the assembler's layout pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddressMap {
    pub addr_to_lines: BTreeMap<u32, Vec<u32>>,
    pub line_to_addr: BTreeMap<u32, u32>,
}

impl AddressMap {
    pub fn bind(&mut self, line: u32, addr: u32) {
        self.addr_to_lines.entry(addr).or_default().push(line);
        self.line_to_addr.insert(line, addr);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub intvec: Section,
    pub code: Section,
    pub data: Section,
}

impl Image {
    pub fn new(intvec: Section, code: Section, data: Section) -> Image {
        Image { intvec, code, data }
    }

    pub fn sections(&self) -> [&Section; 3] {
        [&self.intvec, &self.code, &self.data]
    }
}

pub fn read<R: Read>(reader: &mut R) -> std::io::Result<Image> {
    let read_section = |reader: &mut R| -> std::io::Result<Section> {
        let base = reader.read_u32::<Endian>()?;
        let len = reader.read_u32::<Endian>()?;
        let mut bytes = vec![0; len as usize];
        reader.read_exact(&mut bytes)?;
        Ok(Section { base, bytes })
    };
    let intvec = read_section(reader)?;
    let code = read_section(reader)?;
    let data = read_section(reader)?;
    Ok(Image::new(intvec, code, data))
}

pub fn write<W: Write>(writer: &mut W, image: &Image) -> std::io::Result<()> {
    let write_section = |writer: &mut W, section: &Section| -> std::io::Result<()> {
        writer.write_u32::<Endian>(section.base)?;
        writer.write_u32::<Endian>(section.bytes.len() as u32)?;
        writer.write_all(&section.bytes)
    };
    write_section(writer, &image.intvec)?;
    write_section(writer, &image.code)?;
    write_section(writer, &image.data)
}

pub trait ReadImageExt: Read + Sized {
    fn read_image(&mut self) -> std::io::Result<Image> {
        read(self)
    }
}

impl<R: Read + Sized> ReadImageExt for R {}

pub trait WriteImageExt: Write + Sized {
    fn write_image(&mut self, image: &Image) -> std::io::Result<()> {
        write(self, image)
    }
}

impl<W: Write + Sized> WriteImageExt for W {}

pub fn read_file<P: AsRef<Path>>(path: P) -> std::io::Result<Image> {
    BufReader::new(File::open(path)?).read_image()
}

pub fn write_file<P: AsRef<Path>>(path: P, image: &Image) -> std::io::Result<()> {
    BufWriter::new(File::create(path)?).write_image(image)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip_through_bytes() {
        let image = Image::new(
            Section { base: 0x00, bytes: vec![1, 2] },
            Section { base: 0x80, bytes: vec![3, 4, 5, 6] },
            Section { base: 0x1000, bytes: vec![] },
        );
        let mut buf = Vec::new();
        write(&mut buf, &image).unwrap();
        let decoded = read(&mut &buf[..]).unwrap();
        assert_eq!(decoded, image);
    }
}
