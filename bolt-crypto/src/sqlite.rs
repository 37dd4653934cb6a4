/// Derives `sqlx::Encode`, `sqlx::Decode`, and `sqlx::Type` for SQLite, storing the value as a
/// bincode blob. The type must already implement `serde::Serialize` and `serde::Deserialize`.
#[macro_export]
macro_rules! impl_sqlx_for_bincode_ty {
    ($type:ty) => {
        impl ::sqlx::Type<::sqlx::Sqlite> for $type {
            fn type_info() -> ::sqlx::sqlite::SqliteTypeInfo {
                <::std::vec::Vec<::std::primitive::u8> as ::sqlx::Type<::sqlx::Sqlite>>::type_info()
            }
        }

        impl<'q> ::sqlx::Encode<'q, ::sqlx::Sqlite> for $type {
            fn encode_by_ref(
                &self,
                buf: &mut <::sqlx::Sqlite as ::sqlx::database::HasArguments<'q>>::ArgumentBuffer,
            ) -> ::sqlx::encode::IsNull {
                let bytes = ::bincode::serialize(self).expect(::std::concat!(
                    "could not serialize ",
                    ::std::stringify!($type)
                ));

                <::std::vec::Vec<::std::primitive::u8> as ::sqlx::Encode<'q, ::sqlx::Sqlite>>::encode(
                    bytes, buf,
                )
            }
        }

        impl<'r> ::sqlx::Decode<'r, ::sqlx::Sqlite> for $type {
            fn decode(
                value: ::sqlx::sqlite::SqliteValueRef<'r>,
            ) -> ::std::result::Result<Self, ::sqlx::error::BoxDynError> {
                let blob = <&[::std::primitive::u8] as ::sqlx::Decode<::sqlx::Sqlite>>::decode(value)?;
                ::bincode::deserialize(blob).map_err(|err| {
                    ::std::boxed::Box::new(::sqlx::Error::Decode(::std::boxed::Box::new(err)))
                        as ::sqlx::error::BoxDynError
                })
            }
        }
    };
}

crate::impl_sqlx_for_bincode_ty!(crate::pointcheval_sanders::KeyPair<5>);
crate::impl_sqlx_for_bincode_ty!(crate::pointcheval_sanders::PublicKey<5>);
crate::impl_sqlx_for_bincode_ty!(crate::pedersen::PedersenParameters<crate::common::G1Projective, 1>);
crate::impl_sqlx_for_bincode_ty!(crate::proofs::RangeConstraintParameters);
