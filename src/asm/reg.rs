use std::fmt::Display;

/// The MIPS register file, by conventional name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    Zero,
    At,
    V0,
    V1,
    A0,
    A1,
    A2,
    A3,
    T0,
    T1,
    T2,
    T3,
    T4,
    T5,
    T6,
    T7,
    S0,
    S1,
    S2,
    S3,
    S4,
    S5,
    S6,
    S7,
    T8,
    T9,
    K0,
    K1,
    Gp,
    Sp,
    Fp,
    Ra,
}

impl Reg {
    /// Temporary register `$t<n>`; arrays claim these sequentially.
    pub fn temp(n: usize) -> Option<Reg> {
        match n {
            0 => Some(Reg::T0),
            1 => Some(Reg::T1),
            2 => Some(Reg::T2),
            3 => Some(Reg::T3),
            4 => Some(Reg::T4),
            5 => Some(Reg::T5),
            6 => Some(Reg::T6),
            7 => Some(Reg::T7),
            8 => Some(Reg::T8),
            9 => Some(Reg::T9),
            _ => None,
        }
    }
}

impl Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Reg::Zero => "$zero",
            Reg::At => "$at",
            Reg::V0 => "$v0",
            Reg::V1 => "$v1",
            Reg::A0 => "$a0",
            Reg::A1 => "$a1",
            Reg::A2 => "$a2",
            Reg::A3 => "$a3",
            Reg::T0 => "$t0",
            Reg::T1 => "$t1",
            Reg::T2 => "$t2",
            Reg::T3 => "$t3",
            Reg::T4 => "$t4",
            Reg::T5 => "$t5",
            Reg::T6 => "$t6",
            Reg::T7 => "$t7",
            Reg::S0 => "$s0",
            Reg::S1 => "$s1",
            Reg::S2 => "$s2",
            Reg::S3 => "$s3",
            Reg::S4 => "$s4",
            Reg::S5 => "$s5",
            Reg::S6 => "$s6",
            Reg::S7 => "$s7",
            Reg::T8 => "$t8",
            Reg::T9 => "$t9",
            Reg::K0 => "$k0",
            Reg::K1 => "$k1",
            Reg::Gp => "$gp",
            Reg::Sp => "$sp",
            Reg::Fp => "$fp",
            Reg::Ra => "$ra",
        })
    }
}
