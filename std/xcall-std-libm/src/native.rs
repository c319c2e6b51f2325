//!
//! Native Math Functions
//!
//! In-process `extern "C"` definitions for every entry of the libm table.
//! The functions keep Rust symbol mangling so they never shadow the C
//! library; the linker reaches them by address through `symbols()`.
//!

use xcallc::NativeFn;

macro_rules! math_fns {
    (
        unary { $($u:ident => $um:ident: $ut:ty),* $(,)? }
        binary { $($b:ident => $bm:ident: $bt:ty),* $(,)? }
    ) => {
        $(
            pub extern "C" fn $u(x: $ut) -> $ut {
                x.$um()
            }
        )*

        $(
            pub extern "C" fn $b(x: $bt, y: $bt) -> $bt {
                x.$bm(y)
            }
        )*

        fn generated() -> Vec<(&'static str, NativeFn)> {
            vec![
                $((stringify!($u), NativeFn::new($u as *const u8)),)*
                $((stringify!($b), NativeFn::new($b as *const u8)),)*
            ]
        }
    };
}

math_fns! {
    unary {
        acos => acos: f64, acosf => acos: f32,
        asin => asin: f64, asinf => asin: f32,
        atan => atan: f64, atanf => atan: f32,
        cos => cos: f64, cosf => cos: f32,
        sin => sin: f64, sinf => sin: f32,
        tan => tan: f64, tanf => tan: f32,
        cosh => cosh: f64, coshf => cosh: f32,
        sinh => sinh: f64, sinhf => sinh: f32,
        tanh => tanh: f64, tanhf => tanh: f32,
        exp => exp: f64, expf => exp: f32,
        exp2 => exp2: f64, exp2f => exp2: f32,
        expm1 => exp_m1: f64, expm1f => exp_m1: f32,
        log => ln: f64, logf => ln: f32,
        log2 => log2: f64, log2f => log2: f32,
        log10 => log10: f64, log10f => log10: f32,
        log1p => ln_1p: f64, log1pf => ln_1p: f32,
        sqrt => sqrt: f64, sqrtf => sqrt: f32,
        cbrt => cbrt: f64, cbrtf => cbrt: f32,
        ceil => ceil: f64, ceilf => ceil: f32,
        floor => floor: f64, floorf => floor: f32,
        trunc => trunc: f64, truncf => trunc: f32,
        round => round: f64, roundf => round: f32,
        fabs => abs: f64, fabsf => abs: f32,
    }
    binary {
        atan2 => atan2: f64, atan2f => atan2: f32,
        pow => powf: f64, powf => powf: f32,
        hypot => hypot: f64, hypotf => hypot: f32,
        fmin => min: f64, fminf => min: f32,
        fmax => max: f64, fmaxf => max: f32,
        copysign => copysign: f64, copysignf => copysign: f32,
    }
}

// Rust's `%` on floats truncates toward zero, matching C fmod.
pub extern "C" fn fmod(x: f64, y: f64) -> f64 {
    x % y
}

pub extern "C" fn fmodf(x: f32, y: f32) -> f32 {
    x % y
}

pub extern "C" fn fma(x: f64, y: f64, z: f64) -> f64 {
    x.mul_add(y, z)
}

pub extern "C" fn fmaf(x: f32, y: f32, z: f32) -> f32 {
    x.mul_add(y, z)
}

pub extern "C" fn ldexp(x: f64, exp: i32) -> f64 {
    x * 2f64.powi(exp)
}

pub extern "C" fn ldexpf(x: f32, exp: i32) -> f32 {
    x * 2f32.powi(exp)
}

/// Returns the fractional part of `x` and stores the integral part.
pub unsafe extern "C" fn modf(x: f64, int_part: *mut f64) -> f64 {
    let whole = x.trunc();
    if !int_part.is_null() {
        unsafe { *int_part = whole };
    }
    if x.is_infinite() { 0.0f64.copysign(x) } else { x - whole }
}

pub unsafe extern "C" fn modff(x: f32, int_part: *mut f32) -> f32 {
    let whole = x.trunc();
    if !int_part.is_null() {
        unsafe { *int_part = whole };
    }
    if x.is_infinite() { 0.0f32.copysign(x) } else { x - whole }
}

pub unsafe extern "C" fn sincos(x: f64, sin_out: *mut f64, cos_out: *mut f64) {
    let (s, c) = x.sin_cos();
    unsafe {
        if !sin_out.is_null() {
            *sin_out = s;
        }
        if !cos_out.is_null() {
            *cos_out = c;
        }
    }
}

pub unsafe extern "C" fn sincosf(x: f32, sin_out: *mut f32, cos_out: *mut f32) {
    let (s, c) = x.sin_cos();
    unsafe {
        if !sin_out.is_null() {
            *sin_out = s;
        }
        if !cos_out.is_null() {
            *cos_out = c;
        }
    }
}

/// Every native definition, keyed by its C name.
pub fn symbols() -> Vec<(&'static str, NativeFn)> {
    let mut out = generated();
    out.extend([
        ("fmod", NativeFn::new(fmod as *const u8)),
        ("fmodf", NativeFn::new(fmodf as *const u8)),
        ("fma", NativeFn::new(fma as *const u8)),
        ("fmaf", NativeFn::new(fmaf as *const u8)),
        ("ldexp", NativeFn::new(ldexp as *const u8)),
        ("ldexpf", NativeFn::new(ldexpf as *const u8)),
        ("modf", NativeFn::new(modf as *const u8)),
        ("modff", NativeFn::new(modff as *const u8)),
        ("sincos", NativeFn::new(sincos as *const u8)),
        ("sincosf", NativeFn::new(sincosf as *const u8)),
    ]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_wrappers() {
        assert_eq!(hypot(3.0, 4.0), 5.0);
        assert_eq!(sqrtf(9.0), 3.0);
        assert_eq!(fabs(-2.5), 2.5);
        assert_eq!(pow(2.0, 10.0), 1024.0);
        assert_eq!(copysignf(1.0, -0.0), -1.0);
    }

    #[test]
    fn test_fmod_keeps_sign_of_dividend() {
        assert_eq!(fmod(-7.0, 3.0), -1.0);
        assert_eq!(fmodf(7.5, 2.0), 1.5);
    }

    #[test]
    fn test_modf_splits_value() {
        let mut whole = 0.0;
        assert_eq!(unsafe { modf(-3.5, &mut whole) }, -0.5);
        assert_eq!(whole, -3.0);

        let mut whole = 0.0f32;
        assert_eq!(unsafe { modff(f32::INFINITY, &mut whole) }, 0.0);
        assert_eq!(whole, f32::INFINITY);
    }

    #[test]
    fn test_sincos_writes_both_outputs() {
        let (mut s, mut c) = (1.0, 0.0);
        unsafe { sincos(0.0, &mut s, &mut c) };
        assert_eq!((s, c), (0.0, 1.0));
    }

    #[test]
    fn test_ldexp() {
        assert_eq!(ldexp(0.75, 4), 12.0);
        assert_eq!(ldexpf(8.0, -3), 1.0);
    }

    #[test]
    fn test_symbol_names_are_unique() {
        let mut names: Vec<_> = symbols().into_iter().map(|(name, _)| name).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
