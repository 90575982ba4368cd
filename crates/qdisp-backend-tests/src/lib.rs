pub mod recording_backend;
pub mod smoke;

pub use recording_backend::RecordingBackend;

#[macro_export]
macro_rules! define_backend_tests {
    ($module:ident, $backend_ctor:expr) => {
        #[cfg(test)]
        mod $module {
            use $crate::smoke;

            #[test]
            fn smoke_matmul_matches_expected() {
                let backend = ($backend_ctor)();
                smoke::matmul_matches_expected(&backend);
            }

            #[test]
            fn smoke_binary_broadcasts_rhs() {
                let backend = ($backend_ctor)();
                smoke::binary_broadcasts_rhs(&backend);
            }

            #[test]
            fn smoke_quantize_dequantize_round_trip() {
                let backend = ($backend_ctor)();
                smoke::quantize_dequantize_round_trip(&backend);
            }

            #[test]
            fn smoke_transpose_matches_expected() {
                let backend = ($backend_ctor)();
                smoke::transpose_matches_expected(&backend);
            }

            #[test]
            fn smoke_filling_respects_data_types() {
                let backend = ($backend_ctor)();
                smoke::filling_respects_data_types(&backend);
            }

            #[test]
            fn smoke_displaces_dequantized_matmul_input() {
                let backend = ($backend_ctor)();
                smoke::displaces_dequantized_matmul_input(&backend);
            }

            #[test]
            fn smoke_replays_transpose_and_dequantize() {
                let backend = ($backend_ctor)();
                smoke::replays_transpose_and_dequantize(&backend);
            }
        }
    };
}
