#![forbid(unsafe_code)]

//! Program image loading.
//!
//! Two layouts are supported, told apart by the two-byte executable magic at
//! the start of the file. Anything without the magic is treated as a flat
//! image and placed at the conventional 0000:0100 entry point; images with
//! the magic carry a fixed-layout header that supplies the initial register
//! state.

use std::fs;
use std::io;
use std::path::Path;

use rm86_cpu::{CpuState, SegReg};
use rm86_mem::AddressSpace;

/// "MZ", little-endian.
const EXE_MAGIC: u16 = 0x5A4D;

/// Bytes per header block.
const BLOCK_SIZE: u32 = 512;
const PARAGRAPH_SIZE: u32 = 16;

/// Fixed header length we require before reading any field.
const HEADER_MIN_LEN: usize = 0x18;

/// Flat-image entry conventions.
const FLAT_LOAD_OFFSET: u16 = 0x0100;
const FLAT_STACK_SEGMENT: u16 = 0x3000;
const FLAT_STACK_POINTER: u16 = 0xFFFE;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("failed to read program image: {0}")]
    Io(#[from] io::Error),
    #[error("executable header truncated: {len} bytes")]
    TruncatedHeader { len: usize },
    #[error("executable body out of range: header claims {claimed} bytes, file has {available}")]
    TruncatedBody { claimed: u32, available: usize },
    #[error("program image too large: {len} bytes")]
    TooLarge { len: usize },
}

/// Reads a program image from `path`, places its body into `mem`, and
/// returns the initial register state. The core never validates the image
/// beyond format detection.
pub fn load(path: &Path, mem: &mut AddressSpace) -> Result<CpuState, ImageError> {
    let image = fs::read(path)?;
    if image.len() >= 2 && u16::from_le_bytes([image[0], image[1]]) == EXE_MAGIC {
        load_exe(&image, mem)
    } else {
        load_flat(&image, mem)
    }
}

/// Flat (COM-style) image: bytes land verbatim at 0000:0100, with all
/// segments at zero and the stack placed well clear of the program.
fn load_flat(image: &[u8], mem: &mut AddressSpace) -> Result<CpuState, ImageError> {
    let limit = 0x10000 - FLAT_LOAD_OFFSET as usize;
    if image.len() > limit {
        return Err(ImageError::TooLarge { len: image.len() });
    }
    mem.write_bytes(FLAT_LOAD_OFFSET as u32, image);

    let mut cpu = CpuState::new();
    cpu.ip = FLAT_LOAD_OFFSET;
    cpu.set_seg(SegReg::Ss, FLAT_STACK_SEGMENT);
    cpu.set_sp(FLAT_STACK_POINTER);
    tracing::debug!(len = image.len(), "loaded flat image at 0000:0100");
    Ok(cpu)
}

/// Relocatable (MZ-style) image. Header layout, little-endian u16 fields:
/// magic at 0x00, bytes-in-last-block at 0x02, block count at 0x04, header
/// size in paragraphs at 0x08, initial SS at 0x0E, SP at 0x10, IP at 0x14,
/// CS at 0x16. The body follows the header and is loaded at linear 0.
fn load_exe(image: &[u8], mem: &mut AddressSpace) -> Result<CpuState, ImageError> {
    if image.len() < HEADER_MIN_LEN {
        return Err(ImageError::TruncatedHeader { len: image.len() });
    }
    let field = |off: usize| u16::from_le_bytes([image[off], image[off + 1]]);

    let last_block_bytes = field(0x02) as u32;
    let blocks = field(0x04) as u32;
    let header_paragraphs = field(0x08) as u32;
    let init_ss = field(0x0E);
    let init_sp = field(0x10);
    let init_ip = field(0x14);
    let init_cs = field(0x16);

    let header_len = header_paragraphs * PARAGRAPH_SIZE;
    let total = if last_block_bytes == 0 {
        blocks * BLOCK_SIZE
    } else {
        (blocks.saturating_sub(1)) * BLOCK_SIZE + last_block_bytes
    };
    let body_len = total.saturating_sub(header_len);
    let body_end = (header_len + body_len) as usize;
    if body_end > image.len() {
        return Err(ImageError::TruncatedBody {
            claimed: body_end as u32,
            available: image.len(),
        });
    }
    let body = &image[header_len as usize..body_end];
    if body.len() > rm86_mem::MEM_SIZE {
        return Err(ImageError::TooLarge { len: body.len() });
    }
    mem.write_bytes(0, body);

    // Data lands in the first paragraph past the loaded body.
    let body_paragraphs = (body_len + PARAGRAPH_SIZE - 1) / PARAGRAPH_SIZE;
    let data_seg = init_cs.wrapping_add(body_paragraphs as u16).wrapping_add(1);

    let mut cpu = CpuState::new();
    cpu.ip = init_ip;
    cpu.set_seg(SegReg::Cs, init_cs);
    cpu.set_seg(SegReg::Ss, init_ss);
    cpu.set_sp(init_sp);
    cpu.set_seg(SegReg::Ds, data_seg);
    cpu.set_seg(SegReg::Es, data_seg);
    tracing::debug!(
        body = body.len(),
        cs = init_cs,
        ip = init_ip,
        "loaded relocatable image at linear 0"
    );
    Ok(cpu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn flat_image_lands_at_0100_with_conventions() {
        let file = write_temp(&[0xB8, 0x01, 0x00, 0xF4]);
        let mut mem = AddressSpace::new();
        let cpu = load(file.path(), &mut mem).unwrap();

        assert_eq!(mem.read_u8(0, 0x0100), 0xB8);
        assert_eq!(mem.read_u8(0, 0x0103), 0xF4);
        assert_eq!(cpu.ip, 0x0100);
        assert_eq!(cpu.seg(SegReg::Cs), 0);
        assert_eq!(cpu.seg(SegReg::Ds), 0);
        assert_eq!(cpu.seg(SegReg::Es), 0);
        assert_eq!(cpu.seg(SegReg::Ss), 0x3000);
        assert_eq!(cpu.sp(), 0xFFFE);
    }

    #[test]
    fn flat_image_larger_than_segment_is_rejected() {
        let file = write_temp(&vec![0x90; 0x10000]);
        let mut mem = AddressSpace::new();
        assert!(matches!(
            load(file.path(), &mut mem),
            Err(ImageError::TooLarge { .. })
        ));
    }

    fn exe_header(body: &[u8], ss: u16, sp: u16, ip: u16, cs: u16) -> Vec<u8> {
        // Two header paragraphs (32 bytes), body appended directly after.
        let header_len = 32u32;
        let total = header_len + body.len() as u32;
        let blocks = (total + 511) / 512;
        let last = total % 512;
        let mut image = vec![0u8; header_len as usize];
        image[0x00..0x02].copy_from_slice(&0x5A4Du16.to_le_bytes());
        image[0x02..0x04].copy_from_slice(&(last as u16).to_le_bytes());
        image[0x04..0x06].copy_from_slice(&(blocks as u16).to_le_bytes());
        image[0x08..0x0A].copy_from_slice(&2u16.to_le_bytes());
        image[0x0E..0x10].copy_from_slice(&ss.to_le_bytes());
        image[0x10..0x12].copy_from_slice(&sp.to_le_bytes());
        image[0x14..0x16].copy_from_slice(&ip.to_le_bytes());
        image[0x16..0x18].copy_from_slice(&cs.to_le_bytes());
        image.extend_from_slice(body);
        image
    }

    #[test]
    fn exe_image_takes_registers_from_header() {
        let body = [0xF4u8; 0x20];
        let file = write_temp(&exe_header(&body, 0x0500, 0x0400, 0x0010, 0x0100));
        let mut mem = AddressSpace::new();
        let cpu = load(file.path(), &mut mem).unwrap();

        assert_eq!(mem.read_u8_linear(0), 0xF4);
        assert_eq!(cpu.ip, 0x0010);
        assert_eq!(cpu.seg(SegReg::Cs), 0x0100);
        assert_eq!(cpu.seg(SegReg::Ss), 0x0500);
        assert_eq!(cpu.sp(), 0x0400);
        // 0x20 body bytes = 2 paragraphs; data starts one past them.
        assert_eq!(cpu.seg(SegReg::Ds), 0x0103);
        assert_eq!(cpu.seg(SegReg::Es), 0x0103);
    }

    #[test]
    fn exe_header_shorter_than_fixed_fields_is_rejected() {
        let file = write_temp(&[0x4D, 0x5A, 0x00, 0x00]);
        let mut mem = AddressSpace::new();
        assert!(matches!(
            load(file.path(), &mut mem),
            Err(ImageError::TruncatedHeader { .. })
        ));
    }

    #[test]
    fn exe_body_past_end_of_file_is_rejected() {
        let mut image = exe_header(&[0x90; 16], 0, 0x100, 0, 0);
        image.truncate(image.len() - 8);
        let file = write_temp(&image);
        let mut mem = AddressSpace::new();
        assert!(matches!(
            load(file.path(), &mut mem),
            Err(ImageError::TruncatedBody { .. })
        ));
    }

    #[test]
    fn missing_magic_falls_back_to_flat() {
        let file = write_temp(&[0x90, 0xF4]);
        let mut mem = AddressSpace::new();
        let cpu = load(file.path(), &mut mem).unwrap();
        assert_eq!(cpu.ip, 0x0100);
        assert_eq!(mem.read_u8(0, 0x0101), 0xF4);
    }
}
