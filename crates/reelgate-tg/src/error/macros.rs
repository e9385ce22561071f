/// Builds a crate-level [`Error`](crate::Error) from the body of an error
/// variant. Each field value goes through an [`Into`] conversion, and a bare
/// field name is shorthand for a local variable with the same name.
macro_rules! err {
    (@val $variant_ident:ident $field_val:expr) => ($field_val);
    (@val $variant_ident:ident) => ($variant_ident);
    ($variant_path:path $({
        $( $field_ident:ident $(: $field_val:expr)? ),*
        $(,)?
    })?) => {{
        use $variant_path as Variant;

        $crate::error::Error::from(
            Variant $({$(
                $field_ident: ::std::convert::Into::into(
                    $crate::error::err!(@val $field_ident $($field_val)?)
                )
            ),*})?
        )
    }};
}

/// `map_err` closure that moves the mapped error into the `source` field
/// of the given variant.
macro_rules! err_ctx {
    ($variant_path:path $({ $($variant_fields:tt)* })?) => {
        |source| $crate::error::err!($variant_path { source, $($($variant_fields)*)? })
    };
}

pub(crate) use err;
pub(crate) use err_ctx;
