//! 評価関数ファイルの低レベル入出力
//!
//! 全ての整数はリトルエンディアン。ヘッダは
//! `version(u32) | hash(u32) | desc_len(u32) | desc(bytes)` の順。

use std::io::{Read, Write};

use super::constants::NNUE_VERSION;
use super::error::{NnueError, NnueResult};

#[inline]
pub fn read_u32<R: Read>(reader: &mut R) -> NnueResult<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

#[inline]
pub fn write_u32<W: Write>(writer: &mut W, value: u32) -> NnueResult<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

/// i32 列を読み込む
pub fn read_i32s<R: Read>(reader: &mut R, out: &mut [i32]) -> NnueResult<()> {
    let mut buf = vec![0u8; out.len() * 4];
    reader.read_exact(&mut buf)?;
    for (v, chunk) in out.iter_mut().zip(buf.chunks_exact(4)) {
        *v = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Ok(())
}

pub fn write_i32s<W: Write>(writer: &mut W, values: &[i32]) -> NnueResult<()> {
    let buf: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    writer.write_all(&buf)?;
    Ok(())
}

/// i8 列を読み込む
pub fn read_i8s<R: Read>(reader: &mut R, out: &mut [i8]) -> NnueResult<()> {
    let mut buf = vec![0u8; out.len()];
    reader.read_exact(&mut buf)?;
    for (v, &b) in out.iter_mut().zip(buf.iter()) {
        *v = b as i8;
    }
    Ok(())
}

pub fn write_i8s<W: Write>(writer: &mut W, values: &[i8]) -> NnueResult<()> {
    let buf: Vec<u8> = values.iter().map(|&v| v as u8).collect();
    writer.write_all(&buf)?;
    Ok(())
}

/// ヘッダを読み込み、説明文字列を返す
///
/// バージョン不一致は Format、ハッシュ不一致は HashMismatch。
pub fn read_header<R: Read>(reader: &mut R, expected_hash: u32) -> NnueResult<String> {
    let version = read_u32(reader)?;
    if version != NNUE_VERSION {
        return Err(NnueError::Format(format!(
            "unsupported version {version:#010x} (expected {NNUE_VERSION:#010x})"
        )));
    }

    let hash = read_u32(reader)?;
    if hash != expected_hash {
        return Err(NnueError::HashMismatch { expected: expected_hash, actual: hash });
    }

    let desc_len = read_u32(reader)? as u64;
    let mut desc = Vec::new();
    reader.by_ref().take(desc_len).read_to_end(&mut desc)?;
    if (desc.len() as u64) < desc_len {
        return Err(NnueError::Truncated);
    }
    Ok(String::from_utf8_lossy(&desc).into_owned())
}

pub fn write_header<W: Write>(writer: &mut W, hash: u32, description: &str) -> NnueResult<()> {
    let len = u32::try_from(description.len())
        .map_err(|_| NnueError::Format("description too long".to_string()))?;
    write_u32(writer, NNUE_VERSION)?;
    write_u32(writer, hash)?;
    write_u32(writer, len)?;
    writer.write_all(description.as_bytes())?;
    Ok(())
}

/// ブロック先頭のハッシュタグを検証
pub fn check_hash<R: Read>(reader: &mut R, expected: u32) -> NnueResult<()> {
    let actual = read_u32(reader)?;
    if actual != expected {
        return Err(NnueError::HashMismatch { expected, actual });
    }
    Ok(())
}

/// ストリームが終端に達していることを確認
pub fn ensure_eof<R: Read>(reader: &mut R) -> NnueResult<()> {
    let mut probe = [0u8; 1];
    match reader.read(&mut probe)? {
        0 => Ok(()),
        _ => Err(NnueError::Format("trailing data after the last network".to_string())),
    }
}
