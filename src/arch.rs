use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// A qemu user-mode emulation target, named after the `qemu-<tag>` binary
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    Aarch64,
    Arm,
    Armeb,
    Mips,
    Mipsel,
    Mips64,
    Mips64el,
    Mipsn32,
    Mipsn32el,
    I386,
    #[strum(serialize = "x86_64")]
    #[serde(rename = "x86_64")]
    X86_64,
    Ppc,
    Ppc64,
    Ppc64abi32,
    Ppc64le,
    Sh4,
    Sh4eb,
}

impl Arch {
    pub fn qemu_user_bin(&self) -> String {
        format!("qemu-{}", self)
    }
}

// first match wins, so the specific entries have to come before the generic ones
const ARCH_TABLE: &[(&str, &[Arch])] = &[
    ("aarch64", &[Arch::Aarch64]),
    ("ARM", &[Arch::Aarch64, Arch::Arm, Arch::Armeb]),
    (
        "MIPS32",
        &[Arch::Mipsel, Arch::Mips, Arch::Mipsn32, Arch::Mipsn32el],
    ),
    ("MIPS64", &[Arch::Mips64, Arch::Mips64el]),
    (
        "MIPS",
        &[
            Arch::Mipsel,
            Arch::Mips,
            Arch::Mips64,
            Arch::Mips64el,
            Arch::Mipsn32,
            Arch::Mipsn32el,
        ],
    ),
    ("80386", &[Arch::I386]),
    ("80486", &[Arch::X86_64, Arch::I386]),
    ("x86", &[Arch::X86_64, Arch::I386]),
    (
        "PowerPC",
        &[Arch::Ppc, Arch::Ppc64, Arch::Ppc64abi32, Arch::Ppc64le],
    ),
    ("PPC", &[Arch::Ppc, Arch::Ppc64, Arch::Ppc64abi32, Arch::Ppc64le]),
    ("Renesas SH", &[Arch::Sh4, Arch::Sh4eb]),
];

/// All architectures worth trying for a `file(1)` style type string.
///
/// Empty when nothing in the table matches.
pub fn resolve(full_type: &str) -> &'static [Arch] {
    ARCH_TABLE
        .iter()
        .find(|(pattern, _)| full_type.contains(pattern))
        .map(|(_, arches)| *arches)
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::{resolve, Arch};
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn arm_scenario() {
        let arches = resolve("ELF 32-bit LSB executable, ARM, EABI5 version 1 (SYSV)");
        assert_eq!(arches, &[Arch::Aarch64, Arch::Arm, Arch::Armeb]);
    }

    #[test]
    fn aarch64_beats_arm() {
        // "ARM aarch64" contains both
        let arches = resolve("ELF 64-bit LSB executable, ARM aarch64, version 1 (SYSV)");
        assert_eq!(arches, &[Arch::Aarch64]);
    }

    #[test]
    fn specific_mips_before_generic() {
        let mips32 = resolve("ELF 32-bit MSB executable, MIPS, MIPS32 rel2 version 1 (SYSV)");
        assert_eq!(
            mips32,
            &[Arch::Mipsel, Arch::Mips, Arch::Mipsn32, Arch::Mipsn32el]
        );

        let mips64 = resolve("ELF 64-bit MSB executable, MIPS, MIPS64 version 1 (SYSV)");
        assert_eq!(mips64, &[Arch::Mips64, Arch::Mips64el]);

        let generic = resolve("ELF 32-bit LSB executable, MIPS, MIPS-I version 1 (SYSV)");
        assert_eq!(generic.len(), 6);
    }

    #[test]
    fn x86() {
        assert_eq!(resolve("ELF 32-bit LSB executable, Intel 80386"), &[Arch::I386]);
        assert_eq!(
            resolve("ELF 64-bit LSB shared object, x86-64, version 1 (SYSV)"),
            &[Arch::X86_64, Arch::I386]
        );
    }

    #[test]
    fn no_match() {
        assert!(resolve("ELF 32-bit LSB executable, UCB RISC-V").is_empty());
        assert!(resolve("").is_empty());
    }

    #[test]
    fn tag_names() {
        assert_eq!(Arch::X86_64.to_string(), "x86_64");
        assert_eq!(Arch::Ppc64abi32.to_string(), "ppc64abi32");
        assert_eq!(Arch::Mipsn32el.qemu_user_bin(), "qemu-mipsn32el");
        assert_eq!(
            serde_json::to_string(&Arch::X86_64).unwrap(),
            "\"x86_64\""
        );

        for arch in Arch::iter() {
            assert_eq!(Arch::from_str(&arch.to_string()).unwrap(), arch);
        }
    }
}
