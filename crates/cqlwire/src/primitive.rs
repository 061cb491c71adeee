//! Typed readers and writers for the protocol's primitive notations.
//!
//! Each `[x]` notation from the protocol gets a `read_x`/`write_x` pair over
//! `bytes::Buf`/`bytes::BufMut` plus a `length_of_x` sizing helper so callers
//! can compute body lengths before writing headers. Readers validate
//! remaining bytes before consuming and surface malformed input as
//! `WireError`, never a panic.

use crate::consistency::Consistency;
use crate::error::{Result, WireError};
use bytes::{Buf, BufMut, Bytes};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use uuid::Uuid;

/// A `[value]`: regular bytes, the null sentinel (−1) or not-set (−2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    NotSet,
    Bytes(Bytes),
}

impl Value {
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self::Bytes(data.into())
    }
}

/// An `[inet]`: address plus port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inet {
    pub addr: IpAddr,
    pub port: i32,
}

fn ensure(buf: &impl Buf, what: &'static str, needed: usize) -> Result<()> {
    if buf.remaining() < needed {
        return Err(WireError::eof(what, needed, buf.remaining()));
    }
    Ok(())
}

// ---- fixed-width integers ----

pub fn read_byte(buf: &mut impl Buf) -> Result<u8> {
    ensure(buf, "byte", 1)?;
    Ok(buf.get_u8())
}

pub fn write_byte(value: u8, buf: &mut impl BufMut) {
    buf.put_u8(value);
}

pub fn read_short(buf: &mut impl Buf) -> Result<u16> {
    ensure(buf, "short", 2)?;
    Ok(buf.get_u16())
}

pub fn write_short(value: u16, buf: &mut impl BufMut) {
    buf.put_u16(value);
}

pub fn read_int(buf: &mut impl Buf) -> Result<i32> {
    ensure(buf, "int", 4)?;
    Ok(buf.get_i32())
}

pub fn write_int(value: i32, buf: &mut impl BufMut) {
    buf.put_i32(value);
}

pub fn read_long(buf: &mut impl Buf) -> Result<i64> {
    ensure(buf, "long", 8)?;
    Ok(buf.get_i64())
}

pub fn write_long(value: i64, buf: &mut impl BufMut) {
    buf.put_i64(value);
}

// ---- strings ----

pub fn read_string(buf: &mut impl Buf) -> Result<String> {
    let len = read_short(buf)? as usize;
    ensure(buf, "string", len)?;
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|source| WireError::InvalidUtf8 {
        what: "string",
        source,
    })
}

pub fn write_string(value: &str, buf: &mut impl BufMut) -> Result<()> {
    if value.len() > u16::MAX as usize {
        return Err(WireError::LengthOverflow {
            what: "string",
            len: value.len(),
        });
    }
    buf.put_u16(value.len() as u16);
    buf.put_slice(value.as_bytes());
    Ok(())
}

pub fn length_of_string(value: &str) -> usize {
    2 + value.len()
}

pub fn read_long_string(buf: &mut impl Buf) -> Result<String> {
    let len = read_int(buf)?;
    if len < 0 {
        return Err(WireError::NegativeLength {
            what: "long string",
            len: len as i64,
        });
    }
    let len = len as usize;
    ensure(buf, "long string", len)?;
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|source| WireError::InvalidUtf8 {
        what: "long string",
        source,
    })
}

pub fn write_long_string(value: &str, buf: &mut impl BufMut) -> Result<()> {
    if value.len() > i32::MAX as usize {
        return Err(WireError::LengthOverflow {
            what: "long string",
            len: value.len(),
        });
    }
    buf.put_i32(value.len() as i32);
    buf.put_slice(value.as_bytes());
    Ok(())
}

pub fn length_of_long_string(value: &str) -> usize {
    4 + value.len()
}

// ---- byte blobs ----

/// `[bytes]`: i32 length + contents, length −1 meaning null.
pub fn read_bytes(buf: &mut impl Buf) -> Result<Option<Bytes>> {
    let len = read_int(buf)?;
    if len == -1 {
        return Ok(None);
    }
    if len < 0 {
        return Err(WireError::NegativeLength {
            what: "bytes",
            len: len as i64,
        });
    }
    let len = len as usize;
    ensure(buf, "bytes", len)?;
    Ok(Some(buf.copy_to_bytes(len)))
}

pub fn write_bytes(value: Option<&[u8]>, buf: &mut impl BufMut) -> Result<()> {
    match value {
        None => buf.put_i32(-1),
        Some(data) => {
            if data.len() > i32::MAX as usize {
                return Err(WireError::LengthOverflow {
                    what: "bytes",
                    len: data.len(),
                });
            }
            buf.put_i32(data.len() as i32);
            buf.put_slice(data);
        }
    }
    Ok(())
}

pub fn length_of_bytes(value: Option<&[u8]>) -> usize {
    4 + value.map_or(0, <[u8]>::len)
}

/// `[short bytes]`: u16 length + contents, no null form.
pub fn read_short_bytes(buf: &mut impl Buf) -> Result<Bytes> {
    let len = read_short(buf)? as usize;
    ensure(buf, "short bytes", len)?;
    Ok(buf.copy_to_bytes(len))
}

pub fn write_short_bytes(value: &[u8], buf: &mut impl BufMut) -> Result<()> {
    if value.len() > u16::MAX as usize {
        return Err(WireError::LengthOverflow {
            what: "short bytes",
            len: value.len(),
        });
    }
    buf.put_u16(value.len() as u16);
    buf.put_slice(value);
    Ok(())
}

pub fn length_of_short_bytes(value: &[u8]) -> usize {
    2 + value.len()
}

/// `[value]`: like `[bytes]` with the extra −2 "not set" sentinel.
pub fn read_value(buf: &mut impl Buf) -> Result<Value> {
    let len = read_int(buf)?;
    match len {
        -1 => Ok(Value::Null),
        -2 => Ok(Value::NotSet),
        len if len < 0 => Err(WireError::NegativeLength {
            what: "value",
            len: len as i64,
        }),
        len => {
            let len = len as usize;
            ensure(buf, "value", len)?;
            Ok(Value::Bytes(buf.copy_to_bytes(len)))
        }
    }
}

pub fn write_value(value: &Value, buf: &mut impl BufMut) -> Result<()> {
    match value {
        Value::Null => buf.put_i32(-1),
        Value::NotSet => buf.put_i32(-2),
        Value::Bytes(data) => {
            if data.len() > i32::MAX as usize {
                return Err(WireError::LengthOverflow {
                    what: "value",
                    len: data.len(),
                });
            }
            buf.put_i32(data.len() as i32);
            buf.put_slice(data);
        }
    }
    Ok(())
}

pub fn length_of_value(value: &Value) -> usize {
    match value {
        Value::Null | Value::NotSet => 4,
        Value::Bytes(data) => 4 + data.len(),
    }
}

// ---- vints ----

/// Bytes needed to encode `value` as an `[unsigned vint]`.
pub fn length_of_unsigned_vint(value: u64) -> usize {
    let magnitude = (value | 1).leading_zeros() as usize;
    (639 - magnitude * 9) >> 6
}

/// `[unsigned vint]`: the count of leading one-bits in the first byte gives
/// the number of extra bytes, the rest is the value big-endian.
pub fn write_unsigned_vint(value: u64, buf: &mut impl BufMut) {
    let size = length_of_unsigned_vint(value);
    let extra = size - 1;
    if extra == 8 {
        buf.put_u8(0xFF);
        buf.put_u64(value);
        return;
    }
    let ones = !(0xFFu8.wrapping_shr(extra as u32));
    buf.put_u8(ones | (value >> (8 * extra)) as u8);
    for shift in (0..extra).rev() {
        buf.put_u8((value >> (8 * shift)) as u8);
    }
}

pub fn read_unsigned_vint(buf: &mut impl Buf) -> Result<u64> {
    let first = read_byte(buf)?;
    let extra = first.leading_ones() as usize;
    if extra == 8 {
        return read_long(buf).map(|v| v as u64);
    }
    ensure(buf, "unsigned vint", extra)?;
    let mut value = u64::from(first & (0xFF >> extra));
    for _ in 0..extra {
        value = (value << 8) | u64::from(buf.get_u8());
    }
    Ok(value)
}

fn zigzag(value: i64) -> u64 {
    ((value >> 63) ^ (value << 1)) as u64
}

fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// `[vint]`: zigzag-mapped `[unsigned vint]`.
pub fn write_vint(value: i64, buf: &mut impl BufMut) {
    write_unsigned_vint(zigzag(value), buf);
}

pub fn read_vint(buf: &mut impl Buf) -> Result<i64> {
    read_unsigned_vint(buf).map(unzigzag)
}

pub fn length_of_vint(value: i64) -> usize {
    length_of_unsigned_vint(zigzag(value))
}

// ---- uuid / inet ----

pub fn read_uuid(buf: &mut impl Buf) -> Result<Uuid> {
    ensure(buf, "uuid", 16)?;
    let mut raw = [0u8; 16];
    buf.copy_to_slice(&mut raw);
    Ok(Uuid::from_bytes(raw))
}

pub fn write_uuid(value: &Uuid, buf: &mut impl BufMut) {
    buf.put_slice(value.as_bytes());
}

pub const LENGTH_OF_UUID: usize = 16;

/// `[inetaddr]`: u8 address length (4 or 16) + address bytes.
pub fn read_inet_addr(buf: &mut impl Buf) -> Result<IpAddr> {
    let len = read_byte(buf)?;
    match len {
        4 => {
            ensure(buf, "inetaddr", 4)?;
            let mut raw = [0u8; 4];
            buf.copy_to_slice(&mut raw);
            Ok(IpAddr::V4(Ipv4Addr::from(raw)))
        }
        16 => {
            ensure(buf, "inetaddr", 16)?;
            let mut raw = [0u8; 16];
            buf.copy_to_slice(&mut raw);
            Ok(IpAddr::V6(Ipv6Addr::from(raw)))
        }
        other => Err(WireError::InvalidInetLength(other)),
    }
}

pub fn write_inet_addr(addr: &IpAddr, buf: &mut impl BufMut) {
    match addr {
        IpAddr::V4(v4) => {
            buf.put_u8(4);
            buf.put_slice(&v4.octets());
        }
        IpAddr::V6(v6) => {
            buf.put_u8(16);
            buf.put_slice(&v6.octets());
        }
    }
}

pub fn length_of_inet_addr(addr: &IpAddr) -> usize {
    match addr {
        IpAddr::V4(_) => 1 + 4,
        IpAddr::V6(_) => 1 + 16,
    }
}

pub fn read_inet(buf: &mut impl Buf) -> Result<Inet> {
    let addr = read_inet_addr(buf)?;
    let port = read_int(buf)?;
    Ok(Inet { addr, port })
}

pub fn write_inet(inet: &Inet, buf: &mut impl BufMut) {
    write_inet_addr(&inet.addr, buf);
    buf.put_i32(inet.port);
}

pub fn length_of_inet(inet: &Inet) -> usize {
    length_of_inet_addr(&inet.addr) + 4
}

// ---- collections ----

fn check_count(what: &'static str, count: usize) -> Result<u16> {
    u16::try_from(count).map_err(|_| WireError::LengthOverflow { what, len: count })
}

pub fn read_string_list(buf: &mut impl Buf) -> Result<Vec<String>> {
    let count = read_short(buf)? as usize;
    let mut list = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        list.push(read_string(buf)?);
    }
    Ok(list)
}

pub fn write_string_list(list: &[String], buf: &mut impl BufMut) -> Result<()> {
    buf.put_u16(check_count("string list", list.len())?);
    for item in list {
        write_string(item, buf)?;
    }
    Ok(())
}

pub fn length_of_string_list(list: &[String]) -> usize {
    2 + list.iter().map(|s| length_of_string(s)).sum::<usize>()
}

pub fn read_string_map(buf: &mut impl Buf) -> Result<HashMap<String, String>> {
    let count = read_short(buf)? as usize;
    let mut map = HashMap::with_capacity(count.min(1024));
    for _ in 0..count {
        let key = read_string(buf)?;
        let value = read_string(buf)?;
        map.insert(key, value);
    }
    Ok(map)
}

pub fn write_string_map(map: &HashMap<String, String>, buf: &mut impl BufMut) -> Result<()> {
    buf.put_u16(check_count("string map", map.len())?);
    for (key, value) in map {
        write_string(key, buf)?;
        write_string(value, buf)?;
    }
    Ok(())
}

pub fn length_of_string_map(map: &HashMap<String, String>) -> usize {
    2 + map
        .iter()
        .map(|(k, v)| length_of_string(k) + length_of_string(v))
        .sum::<usize>()
}

pub fn read_string_multimap(buf: &mut impl Buf) -> Result<HashMap<String, Vec<String>>> {
    let count = read_short(buf)? as usize;
    let mut map = HashMap::with_capacity(count.min(1024));
    for _ in 0..count {
        let key = read_string(buf)?;
        let values = read_string_list(buf)?;
        map.insert(key, values);
    }
    Ok(map)
}

pub fn write_string_multimap(
    map: &HashMap<String, Vec<String>>,
    buf: &mut impl BufMut,
) -> Result<()> {
    buf.put_u16(check_count("string multimap", map.len())?);
    for (key, values) in map {
        write_string(key, buf)?;
        write_string_list(values, buf)?;
    }
    Ok(())
}

pub fn length_of_string_multimap(map: &HashMap<String, Vec<String>>) -> usize {
    2 + map
        .iter()
        .map(|(k, v)| length_of_string(k) + length_of_string_list(v))
        .sum::<usize>()
}

pub fn read_bytes_map(buf: &mut impl Buf) -> Result<HashMap<String, Option<Bytes>>> {
    let count = read_short(buf)? as usize;
    let mut map = HashMap::with_capacity(count.min(1024));
    for _ in 0..count {
        let key = read_string(buf)?;
        let value = read_bytes(buf)?;
        map.insert(key, value);
    }
    Ok(map)
}

pub fn write_bytes_map(map: &HashMap<String, Option<Bytes>>, buf: &mut impl BufMut) -> Result<()> {
    buf.put_u16(check_count("bytes map", map.len())?);
    for (key, value) in map {
        write_string(key, buf)?;
        write_bytes(value.as_deref(), buf)?;
    }
    Ok(())
}

pub fn length_of_bytes_map(map: &HashMap<String, Option<Bytes>>) -> usize {
    2 + map
        .iter()
        .map(|(k, v)| length_of_string(k) + length_of_bytes(v.as_deref()))
        .sum::<usize>()
}

// ---- enumerated codes ----

pub fn read_consistency(buf: &mut impl Buf) -> Result<Consistency> {
    let code = read_short(buf)?;
    Consistency::try_from(code).map_err(|_| WireError::UnknownConsistency(code))
}

pub fn write_consistency(value: Consistency, buf: &mut impl BufMut) {
    buf.put_u16(value.as_u16());
}

pub const LENGTH_OF_CONSISTENCY: usize = 2;

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn round_trip<T, W, R>(value: T, write: W, read: R) -> T
    where
        W: FnOnce(&T, &mut BytesMut),
        R: FnOnce(&mut Bytes) -> Result<T>,
    {
        let mut buf = BytesMut::new();
        write(&value, &mut buf);
        let mut frozen = buf.freeze();
        let decoded = read(&mut frozen).unwrap();
        assert_eq!(frozen.remaining(), 0, "trailing bytes after decode");
        decoded
    }

    #[test]
    fn test_integer_round_trips() {
        let decoded = round_trip(0xBEEFu16, |v, b| write_short(*v, b), |b| read_short(b));
        assert_eq!(decoded, 0xBEEF);
        let decoded = round_trip(-12345i32, |v, b| write_int(*v, b), |b| read_int(b));
        assert_eq!(decoded, -12345);
        let decoded = round_trip(i64::MIN, |v, b| write_long(*v, b), |b| read_long(b));
        assert_eq!(decoded, i64::MIN);
    }

    #[test]
    fn test_string_round_trip() {
        let decoded = round_trip(
            "sélect ütf8".to_string(),
            |v, b| write_string(v, b).unwrap(),
            |b| read_string(b),
        );
        assert_eq!(decoded, "sélect ütf8");
    }

    #[test]
    fn test_string_rejects_bad_utf8() {
        let mut buf = BytesMut::new();
        buf.put_u16(2);
        buf.put_slice(&[0xC3, 0x28]);
        let mut frozen = buf.freeze();
        assert!(matches!(
            read_string(&mut frozen),
            Err(WireError::InvalidUtf8 { .. })
        ));
    }

    #[test]
    fn test_string_truncated() {
        let mut buf = BytesMut::new();
        buf.put_u16(10);
        buf.put_slice(b"abc");
        let mut frozen = buf.freeze();
        assert!(matches!(
            read_string(&mut frozen),
            Err(WireError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_long_string_negative_length() {
        let mut buf = BytesMut::new();
        buf.put_i32(-3);
        let mut frozen = buf.freeze();
        assert!(matches!(
            read_long_string(&mut frozen),
            Err(WireError::NegativeLength { .. })
        ));
    }

    #[test]
    fn test_bytes_null() {
        let mut buf = BytesMut::new();
        write_bytes(None, &mut buf).unwrap();
        assert_eq!(&buf[..], &(-1i32).to_be_bytes());
        let mut frozen = buf.freeze();
        assert_eq!(read_bytes(&mut frozen).unwrap(), None);
    }

    #[test]
    fn test_bytes_round_trip() {
        let mut buf = BytesMut::new();
        write_bytes(Some(b"\x01\x02\x03\x04"), &mut buf).unwrap();
        let mut frozen = buf.freeze();
        assert_eq!(
            read_bytes(&mut frozen).unwrap(),
            Some(Bytes::from_static(b"\x01\x02\x03\x04"))
        );
    }

    #[test]
    fn test_value_sentinels() {
        for value in [Value::Null, Value::NotSet, Value::bytes(&b"data"[..])] {
            let mut buf = BytesMut::new();
            write_value(&value, &mut buf).unwrap();
            assert_eq!(buf.len(), length_of_value(&value));
            let mut frozen = buf.freeze();
            assert_eq!(read_value(&mut frozen).unwrap(), value);
        }
    }

    #[test]
    fn test_value_rejects_below_sentinels() {
        let mut buf = BytesMut::new();
        buf.put_i32(-3);
        let mut frozen = buf.freeze();
        assert!(matches!(
            read_value(&mut frozen),
            Err(WireError::NegativeLength { .. })
        ));
    }

    #[test]
    fn test_unsigned_vint_known_vectors() {
        for (value, expected) in [
            (0u64, &[0x00u8][..]),
            (1, &[0x01]),
            (127, &[0x7F]),
            (128, &[0x80, 0x80]),
            (255, &[0x80, 0xFF]),
            (0x3FFF, &[0xBF, 0xFF]),
            (0x4000, &[0xC0, 0x40, 0x00]),
        ] {
            let mut buf = BytesMut::new();
            write_unsigned_vint(value, &mut buf);
            assert_eq!(&buf[..], expected, "encoding of {}", value);
            assert_eq!(buf.len(), length_of_unsigned_vint(value));
            let mut frozen = buf.freeze();
            assert_eq!(read_unsigned_vint(&mut frozen).unwrap(), value);
        }
    }

    #[test]
    fn test_unsigned_vint_extremes() {
        for value in [u64::MAX, u64::MAX - 1, 1 << 56, (1 << 56) - 1] {
            let mut buf = BytesMut::new();
            write_unsigned_vint(value, &mut buf);
            let mut frozen = buf.freeze();
            assert_eq!(read_unsigned_vint(&mut frozen).unwrap(), value);
        }
        let mut buf = BytesMut::new();
        write_unsigned_vint(u64::MAX, &mut buf);
        assert_eq!(buf.len(), 9);
        assert_eq!(buf[0], 0xFF);
    }

    #[test]
    fn test_vint_zigzag_round_trip() {
        for value in [0i64, -1, 1, -2, 63, -64, i64::MAX, i64::MIN] {
            let mut buf = BytesMut::new();
            write_vint(value, &mut buf);
            assert_eq!(buf.len(), length_of_vint(value));
            let mut frozen = buf.freeze();
            assert_eq!(read_vint(&mut frozen).unwrap(), value);
        }
        // Small magnitudes stay small on the wire.
        assert_eq!(length_of_vint(0), 1);
        assert_eq!(length_of_vint(-1), 1);
    }

    #[test]
    fn test_vint_truncated() {
        let mut truncated = Bytes::from_static(&[0x80]);
        assert!(read_unsigned_vint(&mut truncated).is_err());
    }

    #[test]
    fn test_uuid_round_trip() {
        let id = Uuid::from_u128(0x550e8400_e29b_41d4_a716_446655440000);
        let mut buf = BytesMut::new();
        write_uuid(&id, &mut buf);
        assert_eq!(buf.len(), LENGTH_OF_UUID);
        let mut frozen = buf.freeze();
        assert_eq!(read_uuid(&mut frozen).unwrap(), id);
    }

    #[test]
    fn test_inet_round_trips() {
        for addr in [
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            IpAddr::V6(Ipv6Addr::LOCALHOST),
        ] {
            let inet = Inet { addr, port: 9042 };
            let mut buf = BytesMut::new();
            write_inet(&inet, &mut buf);
            assert_eq!(buf.len(), length_of_inet(&inet));
            let mut frozen = buf.freeze();
            assert_eq!(read_inet(&mut frozen).unwrap(), inet);
        }
    }

    #[test]
    fn test_inet_addr_rejects_bad_length() {
        let mut buf = BytesMut::new();
        buf.put_u8(7);
        buf.put_slice(&[0u8; 7]);
        let mut frozen = buf.freeze();
        assert!(matches!(
            read_inet_addr(&mut frozen),
            Err(WireError::InvalidInetLength(7))
        ));
    }

    #[test]
    fn test_string_map_round_trip() {
        let mut map = HashMap::new();
        map.insert("CQL_VERSION".to_string(), "3.0.0".to_string());
        map.insert("COMPRESSION".to_string(), "lz4".to_string());
        let mut buf = BytesMut::new();
        write_string_map(&map, &mut buf).unwrap();
        assert_eq!(buf.len(), length_of_string_map(&map));
        let mut frozen = buf.freeze();
        assert_eq!(read_string_map(&mut frozen).unwrap(), map);
    }

    #[test]
    fn test_string_multimap_round_trip() {
        let mut map = HashMap::new();
        map.insert(
            "CQL_VERSION".to_string(),
            vec!["3.0.0".to_string(), "3.4.5".to_string()],
        );
        map.insert("COMPRESSION".to_string(), vec![]);
        let mut buf = BytesMut::new();
        write_string_multimap(&map, &mut buf).unwrap();
        let mut frozen = buf.freeze();
        assert_eq!(read_string_multimap(&mut frozen).unwrap(), map);
    }

    #[test]
    fn test_bytes_map_round_trip() {
        let mut map = HashMap::new();
        map.insert("key".to_string(), Some(Bytes::from_static(b"payload")));
        map.insert("null".to_string(), None);
        let mut buf = BytesMut::new();
        write_bytes_map(&map, &mut buf).unwrap();
        assert_eq!(buf.len(), length_of_bytes_map(&map));
        let mut frozen = buf.freeze();
        assert_eq!(read_bytes_map(&mut frozen).unwrap(), map);
    }

    #[test]
    fn test_consistency_round_trip() {
        let mut buf = BytesMut::new();
        write_consistency(Consistency::LocalQuorum, &mut buf);
        let mut frozen = buf.freeze();
        assert_eq!(
            read_consistency(&mut frozen).unwrap(),
            Consistency::LocalQuorum
        );
    }
}
