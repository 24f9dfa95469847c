//! Built-in PromQL function signatures

use crate::ast::ValueType;
use once_cell::sync::Lazy;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: &'static str,
    /// Argument types; when `variadic` is set the last entry repeats.
    pub arg_types: &'static [ValueType],
    pub min_args: usize,
    pub variadic: bool,
    pub return_type: ValueType,
    pub description: &'static str,
}

impl FunctionDef {
    pub fn max_args(&self) -> Option<usize> {
        if self.variadic {
            None
        } else {
            Some(self.arg_types.len())
        }
    }

    /// Expected type of the argument at `index`, if the function accepts that many.
    pub fn arg_type(&self, index: usize) -> Option<ValueType> {
        if index < self.arg_types.len() {
            Some(self.arg_types[index])
        } else if self.variadic {
            self.arg_types.last().copied()
        } else {
            None
        }
    }

    /// `rate(range-vector) -> instant-vector`
    pub fn signature(&self) -> String {
        let args: Vec<String> = self
            .arg_types
            .iter()
            .enumerate()
            .map(|(index, ty)| {
                let name = ty.signature_name();
                if self.variadic && index + 1 == self.arg_types.len() {
                    format!("{name}...")
                } else if index >= self.min_args {
                    format!("[{name}]")
                } else {
                    name.to_string()
                }
            })
            .collect();
        format!(
            "{}({}) -> {}",
            self.name,
            args.join(", "),
            self.return_type.signature_name()
        )
    }
}

use ValueType::{Matrix as M, Scalar as S, String as Str, Vector as V};

macro_rules! function {
    ($name:literal, [$($arg:expr),*], $min:expr, $variadic:expr, $ret:expr, $doc:literal) => {
        FunctionDef {
            name: $name,
            arg_types: &[$($arg),*],
            min_args: $min,
            variadic: $variadic,
            return_type: $ret,
            description: $doc,
        }
    };
}

#[rustfmt::skip]
static FUNCTIONS: &[FunctionDef] = &[
    function!("abs", [V], 1, false, V, "Return the absolute value of all sample values."),
    function!("absent", [V], 1, false, V, "Return a 1-element vector if the input vector has no elements."),
    function!("absent_over_time", [M], 1, false, V, "Return a 1-element vector if the range vector has no elements."),
    function!("acos", [V], 1, false, V, "Calculate the arccosine of all sample values."),
    function!("acosh", [V], 1, false, V, "Calculate the inverse hyperbolic cosine of all sample values."),
    function!("asin", [V], 1, false, V, "Calculate the arcsine of all sample values."),
    function!("asinh", [V], 1, false, V, "Calculate the inverse hyperbolic sine of all sample values."),
    function!("atan", [V], 1, false, V, "Calculate the arctangent of all sample values."),
    function!("atanh", [V], 1, false, V, "Calculate the inverse hyperbolic tangent of all sample values."),
    function!("avg_over_time", [M], 1, false, V, "The average value of all points in the specified interval."),
    function!("ceil", [V], 1, false, V, "Round the sample values up to the nearest integer."),
    function!("changes", [M], 1, false, V, "The number of times the value changed within the provided time range."),
    function!("clamp", [V, S, S], 3, false, V, "Clamp the sample values to have a lower limit of min and an upper limit of max."),
    function!("clamp_max", [V, S], 2, false, V, "Clamp the sample values to have an upper limit of max."),
    function!("clamp_min", [V, S], 2, false, V, "Clamp the sample values to have a lower limit of min."),
    function!("cos", [V], 1, false, V, "Calculate the cosine of all sample values."),
    function!("cosh", [V], 1, false, V, "Calculate the hyperbolic cosine of all sample values."),
    function!("count_over_time", [M], 1, false, V, "The count of all values in the specified interval."),
    function!("day_of_month", [V], 0, false, V, "Return the day of the month for each of the given times in UTC."),
    function!("day_of_week", [V], 0, false, V, "Return the day of the week for each of the given times in UTC."),
    function!("day_of_year", [V], 0, false, V, "Return the day of the year for each of the given times in UTC."),
    function!("days_in_month", [V], 0, false, V, "Return the number of days in the month for each of the given times in UTC."),
    function!("deg", [V], 1, false, V, "Convert radians to degrees for all sample values."),
    function!("delta", [M], 1, false, V, "Calculate the difference between the first and last value of each time series in a range vector."),
    function!("deriv", [M], 1, false, V, "Calculate the per-second derivative of the time series in a range vector, using simple linear regression."),
    function!("double_exponential_smoothing", [M, S, S], 3, false, V, "Produce a smoothed value for time series based on the range."),
    function!("exp", [V], 1, false, V, "Calculate the exponential function for all sample values."),
    function!("floor", [V], 1, false, V, "Round the sample values down to the nearest integer."),
    function!("histogram_avg", [V], 1, false, V, "Return the arithmetic average of observed values stored in a native histogram."),
    function!("histogram_count", [V], 1, false, V, "Return the count of observations stored in a native histogram."),
    function!("histogram_fraction", [S, S, V], 3, false, V, "Return the estimated fraction of observations between the provided lower and upper values."),
    function!("histogram_quantile", [S, V], 2, false, V, "Calculate the φ-quantile (0 ≤ φ ≤ 1) from the buckets of a histogram."),
    function!("histogram_stddev", [V], 1, false, V, "Return the estimated standard deviation of observations in a native histogram."),
    function!("histogram_stdvar", [V], 1, false, V, "Return the estimated standard variance of observations in a native histogram."),
    function!("histogram_sum", [V], 1, false, V, "Return the sum of observations stored in a native histogram."),
    function!("holt_winters", [M, S, S], 3, false, V, "Produce a smoothed value for time series based on the range."),
    function!("hour", [V], 0, false, V, "Return the hour of the day for each of the given times in UTC."),
    function!("idelta", [M], 1, false, V, "Calculate the difference between the last two samples in the range vector."),
    function!("increase", [M], 1, false, V, "Calculate the increase in the time series in the range vector."),
    function!("irate", [M], 1, false, V, "Calculate the per-second instant rate of increase of the time series in the range vector, based on the last two data points."),
    function!("label_join", [V, Str, Str, Str], 3, true, V, "Join the values of all the src_labels using separator and store the result in the label dst_label."),
    function!("label_replace", [V, Str, Str, Str, Str], 5, false, V, "Match the regular expression regex against the value of the label src_label and write the replacement to dst_label."),
    function!("last_over_time", [M], 1, false, V, "The most recent point value in the specified interval."),
    function!("ln", [V], 1, false, V, "Calculate the natural logarithm for all sample values."),
    function!("log10", [V], 1, false, V, "Calculate the decimal logarithm for all sample values."),
    function!("log2", [V], 1, false, V, "Calculate the binary logarithm for all sample values."),
    function!("mad_over_time", [M], 1, false, V, "The median absolute deviation of all points in the specified interval."),
    function!("max_over_time", [M], 1, false, V, "The maximum value of all points in the specified interval."),
    function!("min_over_time", [M], 1, false, V, "The minimum value of all points in the specified interval."),
    function!("minute", [V], 0, false, V, "Return the minute of the hour for each of the given times in UTC."),
    function!("month", [V], 0, false, V, "Return the month of the year for each of the given times in UTC."),
    function!("pi", [], 0, false, S, "Return pi."),
    function!("predict_linear", [M, S], 2, false, V, "Predict the value of time series t seconds from now, based on the range vector, using simple linear regression."),
    function!("present_over_time", [M], 1, false, V, "The value 1 for any series in the specified interval."),
    function!("quantile_over_time", [S, M], 2, false, V, "The φ-quantile (0 ≤ φ ≤ 1) of the values in the specified interval."),
    function!("rad", [V], 1, false, V, "Convert degrees to radians for all sample values."),
    function!("rate", [M], 1, false, V, "Calculate the per-second average rate of increase of the time series in the range vector."),
    function!("resets", [M], 1, false, V, "Return the number of counter resets within the provided time range."),
    function!("round", [V, S], 1, false, V, "Round the sample values to the nearest integer, or to the nearest multiple of to_nearest."),
    function!("scalar", [V], 1, false, S, "Return the sample value of a single-element input vector as a scalar."),
    function!("sgn", [V], 1, false, V, "Return the sign of all sample values: 1 if positive, -1 if negative and 0 if zero."),
    function!("sin", [V], 1, false, V, "Calculate the sine of all sample values."),
    function!("sinh", [V], 1, false, V, "Calculate the hyperbolic sine of all sample values."),
    function!("sort", [V], 1, false, V, "Return vector elements sorted by their sample values, in ascending order."),
    function!("sort_by_label", [V, Str], 1, true, V, "Return vector elements sorted by the values of the given labels, in ascending order."),
    function!("sort_by_label_desc", [V, Str], 1, true, V, "Return vector elements sorted by the values of the given labels, in descending order."),
    function!("sort_desc", [V], 1, false, V, "Return vector elements sorted by their sample values, in descending order."),
    function!("sqrt", [V], 1, false, V, "Calculate the square root of all sample values."),
    function!("stddev_over_time", [M], 1, false, V, "The population standard deviation of the values in the specified interval."),
    function!("stdvar_over_time", [M], 1, false, V, "The population standard variance of the values in the specified interval."),
    function!("sum_over_time", [M], 1, false, V, "The sum of all values in the specified interval."),
    function!("tan", [V], 1, false, V, "Calculate the tangent of all sample values."),
    function!("tanh", [V], 1, false, V, "Calculate the hyperbolic tangent of all sample values."),
    function!("time", [], 0, false, S, "Return the number of seconds since January 1, 1970 UTC."),
    function!("timestamp", [V], 1, false, V, "Return the timestamp of each of the samples of the given vector."),
    function!("vector", [S], 1, false, V, "Return the scalar as a vector with no labels."),
    function!("year", [V], 0, false, V, "Return the year for each of the given times in UTC."),
];

static BY_NAME: Lazy<HashMap<&'static str, &'static FunctionDef>> =
    Lazy::new(|| FUNCTIONS.iter().map(|def| (def.name, def)).collect());

pub fn lookup(name: &str) -> Option<&'static FunctionDef> {
    BY_NAME.get(name).copied()
}

/// All functions, sorted by name.
pub fn all() -> &'static [FunctionDef] {
    FUNCTIONS
}
