//! Arithmetic and logic helpers shared by the CPU.
//!
//! Every function is pure: it takes the operands plus the incoming flag byte
//! and returns the result together with the new flag byte.

use crate::registers::{FLAG_C, FLAG_H, FLAG_N, FLAG_Z};

#[inline(always)]
fn z(val: u8) -> u8 {
    if val == 0 { FLAG_Z } else { 0 }
}

#[inline(always)]
fn bit(cond: bool, mask: u8) -> u8 {
    if cond { mask } else { 0 }
}

/// ADD / ADC.
pub fn add(a: u8, b: u8, carry_in: bool) -> (u8, u8) {
    let c = carry_in as u16;
    let wide = a as u16 + b as u16 + c;
    let res = wide as u8;
    let half = (a & 0x0F) as u16 + (b & 0x0F) as u16 + c > 0x0F;
    (res, z(res) | bit(half, FLAG_H) | bit(wide > 0xFF, FLAG_C))
}

/// SUB / SBC. `CP` is this with the result discarded.
pub fn sub(a: u8, b: u8, carry_in: bool) -> (u8, u8) {
    let c = carry_in as i16;
    let wide = a as i16 - b as i16 - c;
    let res = wide as u8;
    let half = (a & 0x0F) as i16 - (b & 0x0F) as i16 - c < 0;
    (
        res,
        FLAG_N | z(res) | bit(half, FLAG_H) | bit(wide < 0, FLAG_C),
    )
}

pub fn and(a: u8, b: u8) -> (u8, u8) {
    let res = a & b;
    (res, z(res) | FLAG_H)
}

pub fn or(a: u8, b: u8) -> (u8, u8) {
    let res = a | b;
    (res, z(res))
}

pub fn xor(a: u8, b: u8) -> (u8, u8) {
    let res = a ^ b;
    (res, z(res))
}

/// INC r: carry is preserved.
pub fn inc(val: u8, flags: u8) -> (u8, u8) {
    let res = val.wrapping_add(1);
    (
        res,
        (flags & FLAG_C) | z(res) | bit(val & 0x0F == 0x0F, FLAG_H),
    )
}

/// DEC r: carry is preserved.
pub fn dec(val: u8, flags: u8) -> (u8, u8) {
    let res = val.wrapping_sub(1);
    (
        res,
        (flags & FLAG_C) | FLAG_N | z(res) | bit(val & 0x0F == 0, FLAG_H),
    )
}

/// ADD HL,rr: half carry out of bit 11, carry out of bit 15, zero preserved.
pub fn add16(hl: u16, val: u16, flags: u8) -> (u16, u8) {
    let (res, carry) = hl.overflowing_add(val);
    let half = (hl & 0x0FFF) + (val & 0x0FFF) > 0x0FFF;
    (
        res,
        (flags & FLAG_Z) | bit(half, FLAG_H) | bit(carry, FLAG_C),
    )
}

/// ADD SP,e8 and LD HL,SP+e8. Flags come from the unsigned low-byte add;
/// Z and N are always clear.
pub fn add_sp(sp: u16, offset: u8) -> (u16, u8) {
    let res = sp.wrapping_add(offset as i8 as u16);
    let half = (sp & 0x000F) + (offset as u16 & 0x000F) > 0x000F;
    let carry = (sp & 0x00FF) + offset as u16 > 0x00FF;
    (res, bit(half, FLAG_H) | bit(carry, FLAG_C))
}

/// Decimal adjust after a BCD add or subtract.
pub fn daa(a: u8, flags: u8) -> (u8, u8) {
    let subtract = flags & FLAG_N != 0;
    let mut correction = 0u8;
    let mut carry = false;
    if flags & FLAG_H != 0 || (!subtract && a & 0x0F > 0x09) {
        correction |= 0x06;
    }
    if flags & FLAG_C != 0 || (!subtract && a > 0x99) {
        correction |= 0x60;
        carry = true;
    }
    let res = if subtract {
        a.wrapping_sub(correction)
    } else {
        a.wrapping_add(correction)
    };
    (res, z(res) | (flags & FLAG_N) | bit(carry, FLAG_C))
}

pub fn cpl(a: u8, flags: u8) -> (u8, u8) {
    (!a, (flags & (FLAG_Z | FLAG_C)) | FLAG_N | FLAG_H)
}

pub fn scf(flags: u8) -> u8 {
    (flags & FLAG_Z) | FLAG_C
}

pub fn ccf(flags: u8) -> u8 {
    (flags & FLAG_Z) | ((flags & FLAG_C) ^ FLAG_C)
}

pub fn rlc(val: u8) -> (u8, u8) {
    let res = val.rotate_left(1);
    (res, z(res) | bit(val & 0x80 != 0, FLAG_C))
}

pub fn rrc(val: u8) -> (u8, u8) {
    let res = val.rotate_right(1);
    (res, z(res) | bit(val & 0x01 != 0, FLAG_C))
}

pub fn rl(val: u8, flags: u8) -> (u8, u8) {
    let res = (val << 1) | (flags & FLAG_C != 0) as u8;
    (res, z(res) | bit(val & 0x80 != 0, FLAG_C))
}

pub fn rr(val: u8, flags: u8) -> (u8, u8) {
    let res = (val >> 1) | (((flags & FLAG_C != 0) as u8) << 7);
    (res, z(res) | bit(val & 0x01 != 0, FLAG_C))
}

pub fn sla(val: u8) -> (u8, u8) {
    let res = val << 1;
    (res, z(res) | bit(val & 0x80 != 0, FLAG_C))
}

pub fn sra(val: u8) -> (u8, u8) {
    let res = (val >> 1) | (val & 0x80);
    (res, z(res) | bit(val & 0x01 != 0, FLAG_C))
}

pub fn srl(val: u8) -> (u8, u8) {
    let res = val >> 1;
    (res, z(res) | bit(val & 0x01 != 0, FLAG_C))
}

pub fn swap(val: u8) -> (u8, u8) {
    let res = val.rotate_left(4);
    (res, z(res))
}

/// BIT n,r: only flags change.
pub fn test_bit(n: u8, val: u8, flags: u8) -> u8 {
    (flags & FLAG_C) | FLAG_H | z(val & (1 << n))
}
