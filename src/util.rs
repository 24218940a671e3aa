pub fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }

    a
}

pub fn lcm(a: usize, b: usize) -> usize {
    if a == 0 || b == 0 {
        return 0;
    }

    a / gcd(a, b) * b
}

pub fn prod(dims: &[usize]) -> usize {
    dims.iter().product()
}

/// `prod`, or `None` once the product leaves `usize`.
pub fn checked_prod(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// Bytes needed to move `offset` up to the next multiple of `align`.
pub fn padding_to(offset: usize, align: usize) -> usize {
    if align <= 1 {
        return 0;
    }

    (align - offset % align) % align
}
