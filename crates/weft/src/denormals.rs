//! Denormal-handling CPU flags.

/// Set the FTZ (flush-to-zero) and DAZ (denormals-are-zero) flags in the
/// calling thread's MXCSR register, so denormal numbers cannot stall audio
/// DSP with microcode assists.
///
/// Per-thread; each worker calls this for itself. x86/x86_64 with SSE only;
/// a no-op everywhere else.
pub fn set_flush_denormals_to_zero() {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        // MXCSR bit 15 = FTZ, bit 6 = DAZ.
        const FTZ_AND_DAZ: u32 = 0x8040;

        let mut csr: u32 = 0;
        // SAFETY: stmxcsr/ldmxcsr only move the 32-bit MXCSR register
        // through the pointed-to slot.
        unsafe {
            core::arch::asm!("stmxcsr [{ptr}]", ptr = in(reg) &mut csr, options(nostack));
            csr |= FTZ_AND_DAZ;
            core::arch::asm!("ldmxcsr [{ptr}]", ptr = in(reg) &csr, options(nostack, readonly));
        }
    }
}
